//! Integration tests for rendering documents end to end.

use templet::{FetchError, RenderResult, Session, TemplateData};

fn render(template: &str, data: &str) -> RenderResult {
    let mut fetch = |url: &str| -> Result<String, FetchError> {
        Err(FetchError::NotFound {
            url: url.to_string(),
        })
    };
    Session::new().render(template, data, &mut fetch)
}

fn text(template: &str, data: &str) -> String {
    render(template, data).result
}

const PEOPLE: &str = r#"{
    "name": "Team",
    "people": [
        {"name": "Ann", "age": 40, "city": "Oslo"},
        {"name": "Bo", "age": 20, "city": "Rome"},
        {"name": "Cy", "age": 35, "city": "Oslo"}
    ]
}"#;

// =============================================================================
// Plain Text and Identifiers
// =============================================================================

#[test]
fn plain_text_renders_unchanged() {
    let result = render("hello", "");
    assert_eq!(result.result, "hello");
    assert!(result.errors.is_empty());
}

#[test]
fn identifier_resolves_against_data() {
    assert_eq!(text("Hello {name}!", r#"{"name": "Ann"}"#), "Hello Ann!");
}

#[test]
fn dotted_path() {
    assert_eq!(
        text("{address.city}", r#"{"address": {"city": "Oslo"}}"#),
        "Oslo"
    );
}

#[test]
fn numbers_and_booleans_render_as_text() {
    assert_eq!(
        text("{n} {x} {ok}", r#"{"n": 3, "x": 1.5, "ok": true}"#),
        "3 1.5 true"
    );
}

#[test]
fn missing_value_renders_empty_and_is_logged() {
    let result = render("{name}", "{}");
    assert_eq!(result.result, "");
    assert!(result.errors.is_empty());
    assert_eq!(result.debug_log.len(), 1);
    assert_eq!(result.debug_log[0].level, 1);
    assert_eq!(result.debug_log[0].text, "missing value for 'name'");
}

#[test]
fn missing_value_fallback_substitutes_key() {
    assert_eq!(text("{name.@MissingValue('<{key}>')}", "{}"), "<name>");
}

#[test]
fn null_entries_are_missing() {
    assert_eq!(text("a{gone}b", r#"{"gone": null}"#), "ab");
}

#[test]
fn escapes_and_comments() {
    let template = "// a comment line\n\\{literal\\} \\[x\\]";
    assert_eq!(text(template, ""), "{literal} [x]");
}

#[test]
fn scalar_list_renders_one_per_line() {
    assert_eq!(text("  {tags}", r#"{"tags": ["a", "b"]}"#), "  a\n  b");
}

#[test]
fn invalid_expression_is_reported_and_rest_renders() {
    let result = render("before {a b} after", "{}");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].start_line, 1);
    assert_eq!(result.errors[0].start_col, 8);
    assert!(result.result.starts_with("before ERROR: "));
    assert!(result.result.ends_with(" after"));
}

// =============================================================================
// Context Switches and Broadcasting
// =============================================================================

#[test]
fn context_switch_into_dictionary() {
    assert_eq!(
        text(
            "{address:[{city}, {^.name}]}",
            r#"{"name": "Ann", "address": {"city": "Oslo"}}"#
        ),
        "Oslo, Ann"
    );
}

#[test]
fn bracket_broadcasts_over_list() {
    insta::assert_snapshot!(text("{people:[{name} ({age})]}", PEOPLE), @r"
    Ann (40)
    Bo (20)
    Cy (35)
    ");
}

#[test]
fn broadcast_keeps_indent() {
    insta::assert_snapshot!(text("Names:\n  {people:[- {name}]}", PEOPLE), @r"
    Names:
      - Ann
      - Bo
      - Cy
    ");
}

#[test]
fn aggregate_switch_evaluates_once() {
    assert_eq!(
        text("{people::[{name.Join(', ', ' and ')}]}", PEOPLE),
        "Ann, Bo and Cy"
    );
}

#[test]
fn projection_over_list() {
    assert_eq!(text("{people.city.Join('/')}", PEOPLE), "Oslo/Rome/Oslo");
}

#[test]
fn index_is_the_broadcast_position() {
    assert_eq!(
        text("{people:[{Index()}:{name}]}", PEOPLE),
        "1:Ann\n2:Bo\n3:Cy"
    );
}

#[test]
fn inline_json_context() {
    assert_eq!(text(r#"{{"a": 1, "b": [2, 3]}:[{a}+{b.Join('+')}]}"#, ""), "1+2+3");
}

#[test]
fn missing_context_renders_nothing() {
    let result = render("x{nothing:[body]}y", "{}");
    assert_eq!(result.result, "xy");
    assert!(result.errors.is_empty());
}

#[test]
fn parent_bindings_are_visible_in_elements() {
    let data = r#"{"$sep": "-", "rows": [{"v": "a"}, {"v": "b"}]}"#;
    assert_eq!(text("{rows:[{$sep}{v}]}", data), "-a\n-b");
}

// =============================================================================
// Conditionals
// =============================================================================

#[test]
fn conditional_with_else() {
    let template = "{people:[{name}: {age > 30 -> 'senior' : 'junior'}]}";
    insta::assert_snapshot!(text(template, PEOPLE), @r"
    Ann: senior
    Bo: junior
    Cy: senior
    ");
}

#[test]
fn conditional_without_else_renders_nothing() {
    assert_eq!(text("{flag -> 'on'}", r#"{"flag": false}"#), "");
    assert_eq!(text("{flag -> 'on'}", r#"{"flag": "yes"}"#), "on");
}

#[test]
fn comparisons_are_numeric_only_for_numbers() {
    assert_eq!(text("{'9' < '10' -> 'num' : 'text'}", ""), "num");
    assert_eq!(text("{'9a' < '10a' -> 'num' : 'text'}", ""), "text");
}

#[test]
fn missing_operands_in_comparisons() {
    assert_eq!(text("{a = b -> 'same' : 'different'}", "{}"), "same");
    assert_eq!(text(r#"{a != b -> 'yes' : 'no'}"#, r#"{"a": 1}"#), "yes");
    assert_eq!(text(r#"{a = b -> 'yes' : 'no'}"#, r#"{"a": 1}"#), "no");
    assert_eq!(text(r#"{b < a -> 'yes' : 'no'}"#, r#"{"a": 1}"#), "no");
}

#[test]
fn predicates_do_not_render_missing_fallback() {
    let template = "{[{name -> 'set' : 'unset'}].@MissingValue('?')}";
    assert_eq!(text(template, "{}"), "unset");
}

#[test]
fn logic_operators() {
    let data = r#"{"a": true, "b": false}"#;
    assert_eq!(text("{a & b -> 'x' : 'y'}", data), "y");
    assert_eq!(text("{a | b -> 'x' : 'y'}", data), "x");
    assert_eq!(text("{!b -> 'x' : 'y'}", data), "x");
}

#[test]
fn falsy_pattern_is_configurable() {
    let data = r#"{"flag": "off"}"#;
    assert_eq!(text("{flag -> 'on' : 'off'}", data), "on");
    assert_eq!(
        text("{[{flag -> 'on' : 'off'}].@Falsy('^off$')}", data),
        "off"
    );
}

// =============================================================================
// Line Deletion
// =============================================================================

#[test]
fn failed_assert_deletes_its_line() {
    let template = "keep\n{flag.Assert()} dropped\nafter";
    assert_eq!(text(template, "{}"), "keep\nafter");
    assert_eq!(
        text(template, r#"{"flag": true}"#),
        "keep\n dropped\nafter"
    );
}

#[test]
fn failed_assert_deletes_only_its_list_element() {
    let data = r#"{"people": [
        {"name": "Ann", "ok": true},
        {"name": "Bo", "ok": false},
        {"name": "Cy", "ok": true}
    ]}"#;
    assert_eq!(text("{people:[{ok.Assert()}{name}]}", data), "Ann\nCy");
    assert_eq!(
        text("Team:\n  {people:[{ok.Assert()}- {name}]}\nend", data),
        "Team:\n  - Ann\n  - Cy\nend"
    );
}

// =============================================================================
// Data Model
// =============================================================================

#[test]
fn canonical_text_round_trip_is_idempotent() {
    let source = r#"{"a": 1, "gone": null, "empty": [], "list": [1, null, 2], "one": [{"b": "x"}]}"#;
    let first = TemplateData::parse(source).unwrap().to_canonical_text(0);
    assert_eq!(first, r#"{"a":1,"list":[1,2],"one":{"b":"x"}}"#);
    let second = TemplateData::parse(&first).unwrap().to_canonical_text(0);
    assert_eq!(first, second);
}

#[test]
fn dictionary_renders_as_json() {
    assert_eq!(
        text("{address}", r#"{"address": {"city": "Oslo", "zip": 1}}"#),
        r#"{"city":"Oslo","zip":1}"#
    );
}

// =============================================================================
// Meta Keys
// =============================================================================

#[test]
fn meta_key_reads_annotation() {
    assert_eq!(text("{@.DefaultIndent}", ""), "3");
    assert_eq!(
        text("{[{@.MissingValue}].@MissingValue('n/a')}", ""),
        "n/a"
    );
}

#[test]
fn unknown_meta_key_is_an_error() {
    let result = render("{@.Nope}", "");
    assert_eq!(result.result, "ERROR: unknown meta key '@.Nope'");
    assert_eq!(result.errors.len(), 1);
}
