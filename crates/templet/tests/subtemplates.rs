//! Integration tests for named sub-templates.

use std::collections::HashMap;

use templet::{FetchError, RenderResult, Session};

fn render(template: &str, data: &str) -> RenderResult {
    render_with_remote(template, data, &HashMap::new())
}

/// Render, serving `remote` as the fetchable locations.
fn render_with_remote(
    template: &str,
    data: &str,
    remote: &HashMap<&str, &str>,
) -> RenderResult {
    let mut fetch = |url: &str| -> Result<String, FetchError> {
        remote
            .get(url)
            .map(ToString::to_string)
            .ok_or_else(|| FetchError::NotFound {
                url: url.to_string(),
            })
    };
    Session::new().render(template, data, &mut fetch)
}

// =============================================================================
// Invocation
// =============================================================================

#[test]
fn invokes_document_subtemplate() {
    let template = "Hello {#Greet}!\n\nSubtemplates:\n{#Greet:[world]}\n";
    let result = render(template, "");
    assert_eq!(result.result, "Hello world!");
    assert!(result.errors.is_empty());
}

#[test]
fn subtemplate_runs_against_current_context() {
    let template = "{people:[{#Row}]}\nSubtemplates:\n{#Row:[- {name}]}";
    let data = r#"{"people": [{"name": "Ann"}, {"name": "Bo"}]}"#;
    insta::assert_snapshot!(render(template, data).result, @r"
    - Ann
    - Bo
    ");
}

#[test]
fn subtemplate_body_takes_methods() {
    let template = "{#Caps}\nSubtemplates:\n{#Caps:[{name}].ToUpper()}";
    assert_eq!(render(template, r#"{"name": "ann"}"#).result, "ANN");
}

#[test]
fn nested_subtemplates_shadow_outer_names() {
    let template = "{#Outer} {#Inner}\nSubtemplates:\n\
        {#Outer:[\n{#Inner}\nSubtemplates:\n{#Inner:[local]}\n]}\n\
        {#Inner:[doc]}";
    let result = render(template, "");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.result, "local doc");
}

#[test]
fn last_definition_wins() {
    let template = "{#A}\nSubtemplates:\n{#A:[first]}\n{#A:[second]}";
    assert_eq!(render(template, "").result, "second");
}

// =============================================================================
// Recursion
// =============================================================================

#[test]
fn self_recursion_stops_at_the_limit() {
    let template = "{#Loop}\nSubtemplates:\n{#Loop:[x{#Loop}]}";
    let result = render(template, "");
    let expected = format!(
        "{}ERROR: too many levels of recursion (#Loop)",
        "x".repeat(20)
    );
    assert_eq!(result.result, expected);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].start_line, 3);
}

#[test]
fn two_template_cycle_stops_at_the_limit() {
    let template = "{#Ping}\nSubtemplates:\n{#Ping:[a{#Pong}]}\n{#Pong:[b{#Ping}]}";
    let result = render(template, "");
    let expected = format!(
        "{}ERROR: too many levels of recursion (#Ping)",
        "ab".repeat(10)
    );
    assert_eq!(result.result, expected);
}

#[test]
fn recursion_over_data_terminates_naturally() {
    let template = "{#Tree}\nSubtemplates:\n{#Tree:[{name}{children:[ ({#Tree})]}]}";
    let data = r#"{"name": "a", "children": [{"name": "b"}, {"name": "c", "children": {"name": "d"}}]}"#;
    let result = render(template, data);
    assert!(result.errors.is_empty());
    insta::assert_snapshot!(result.result, @r"
    a (b)
     (c (d))
    ");
}

#[test]
fn max_depth_is_configurable() {
    let template = "{#Loop}\nSubtemplates:\n{#Loop:[x{#Loop}]}";
    let mut session = Session::builder().max_depth(3).build();
    let mut fetch = |url: &str| -> Result<String, FetchError> {
        Err(FetchError::NotFound {
            url: url.to_string(),
        })
    };
    let result = session.render(template, "", &mut fetch);
    assert_eq!(
        result.result,
        "xxxERROR: too many levels of recursion (#Loop)"
    );
}

// =============================================================================
// Remote Sub-templates
// =============================================================================

#[test]
fn unknown_subtemplate_is_fetched() {
    let remote = HashMap::from([("/subtemplate/Remote", "[from afar, {name}]")]);
    let result = render_with_remote("{#Remote}", r#"{"name": "Ann"}"#, &remote);
    assert_eq!(result.result, "from afar, Ann");
    assert!(result.errors.is_empty());
}

#[test]
fn unavailable_subtemplate_is_an_error() {
    let result = render("a {#Nope} b", "");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(
        result.errors[0].message,
        "sub-template #Nope could not be loaded: '/subtemplate/Nope' was not found"
    );
    assert!(result.result.starts_with("a ERROR: sub-template #Nope"));
    assert!(result.result.ends_with(" b"));
}

#[test]
fn malformed_remote_body_is_an_error() {
    let remote = HashMap::from([("/subtemplate/Bad", "no brackets")]);
    let result = render_with_remote("{#Bad}", "", &remote);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.starts_with("invalid sub-template #Bad"));
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn errors_inside_subtemplates_point_into_the_document() {
    let template = "{#Bad}\nSubtemplates:\n{#Bad:[{x.Nope()}]}";
    let result = render(template, "{}");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].start_line, 3);
    assert_eq!(result.errors[0].start_col, 11);
}

#[test]
fn malformed_block_becomes_an_error_line() {
    let template = "x\nSubtemplates:\n{Bad:[y]}\n{#Good:[z]}";
    let result = render(template, "");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].start_line, 3);
    assert_eq!(
        result.result,
        "x\nERROR: invalid sub-template: expected '#Name:' header (line 3)"
    );
}

#[test]
fn blocks_after_a_malformed_block_are_still_defined() {
    let template = "{#A}|{#B}\nSubtemplates:\n{#A:[a}\n{#B:[b]}\n";
    let result = render(template, "");
    let first_line = result.result.lines().next().unwrap();
    assert!(first_line.ends_with("|b"), "{first_line}");
    assert!(result.errors.iter().any(|e| e.start_line == 3));
    assert!(!result.errors.iter().any(|e| e.message.contains("#B")));
}
