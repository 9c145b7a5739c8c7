//! Integration tests for bullet numbering and list layout.

use templet::{FetchError, Session};

fn text(template: &str, data: &str) -> String {
    let mut fetch = |url: &str| -> Result<String, FetchError> {
        Err(FetchError::NotFound {
            url: url.to_string(),
        })
    };
    Session::new().render(template, data, &mut fetch).result
}

const PEOPLE: &str = r#"{"people": [{"name": "Ann"}, {"name": "Bo"}]}"#;

// =============================================================================
// Levels From Indentation
// =============================================================================

#[test]
fn flat_bullets_count_up() {
    insta::assert_snapshot!(text("{.} one\n{.} two\n{.} three", ""), @r"
    1. one
    2. two
    3. three
    ");
}

#[test]
fn indented_bullets_nest() {
    let template = "{.} one\n   {.} sub\n   {.} sub\n      {.} deeper\n{.} two";
    insta::assert_snapshot!(text(template, ""), @r"
    1. one
       a. sub
       b. sub
          i. deeper
    2. two
    ");
}

#[test]
fn shallower_indent_gets_lower_level() {
    let template = "   {.} deep\n{.} top";
    insta::assert_snapshot!(text(template, ""), @r"
       a. deep
    1. top
    ");
}

#[test]
fn plain_lines_do_not_break_numbering() {
    let template = "{.} one\nnote\n{.} two";
    insta::assert_snapshot!(text(template, ""), @r"
    1. one
    note
    2. two
    ");
}

// =============================================================================
// Lists Inside Bullets
// =============================================================================

#[test]
fn broadcast_bullets_become_siblings() {
    insta::assert_snapshot!(text("{people:[{.} {name}\n]}", PEOPLE), @r"
    1. Ann
    2. Bo
    ");
}

#[test]
fn list_inside_bullet_starts_on_a_new_line() {
    let template = "{.} People{people:[{.} {name}]}\n{.} Done";
    insta::assert_snapshot!(text(template, PEOPLE), @r"
    1. People
       a. Ann
       b. Bo
    2. Done
    ");
}

#[test]
fn default_indent_controls_list_indent() {
    let template = "{[{.} People{people:[{.} {name}]}].@DefaultIndent(2)}";
    insta::assert_snapshot!(text(template, PEOPLE), @r"
    1. People
      a. Ann
      b. Bo
    ");
}

#[test]
fn deleted_lines_take_their_bullets_along() {
    let template = "{.} one\n{.} {gone.Assert()}two\n{.} three";
    insta::assert_snapshot!(text(template, "{}"), @r"
    1. one
    2. three
    ");
}

// =============================================================================
// Styles and Modes
// =============================================================================

#[test]
fn explicit_style() {
    let template = "{[\n{.} a\n{.} b\n].@BulletStyle('I.')}";
    insta::assert_snapshot!(text(template, ""), @r"
    I. a
    II. b
    ");
}

#[test]
fn style_tokens_with_start_and_padding() {
    let template = "{[\n{.} a\n{.} b\n].@BulletStyle('(01:9)')}";
    insta::assert_snapshot!(text(template, ""), @r"
    (09) a
    (10) b
    ");
}

#[test]
fn literal_glyph_styles() {
    let template = "{[\n{.} a\n   {.} b\n].@BulletStyle('*', '-')}";
    insta::assert_snapshot!(text(template, ""), @r"
    * a
       - b
    ");
}

#[test]
fn continue_mode_resumes_numbering() {
    let template = "{.} a\n   {.} b\n{.} c\n   {[{.} d].@BulletMode('continue')}";
    insta::assert_snapshot!(text(template, ""), @r"
    1. a
       a. b
    2. c
       b. d
    ");
}

#[test]
fn restart_mode_starts_over() {
    let template = "{.} a\n   {.} b\n{.} c\n   {.} d";
    insta::assert_snapshot!(text(template, ""), @r"
    1. a
       a. b
    2. c
       a. d
    ");
}
