//! Right-to-left stylesheet mirroring.

use super::{CssVisitor, Declaration, split_commas, split_tokens, walk};

/// Properties whose `left`/`right` keywords are swapped.
const KEYWORD_PROPERTIES: &[&str] = &[
  "float",
  "clear",
  "text-align",
  "background-position",
  "background-position-x",
  "transform-origin",
  "perspective-origin",
];

/// Four-value `top right bottom left` shorthands.
const BOX_SHORTHANDS: &[&str] = &[
  "margin",
  "padding",
  "border-width",
  "border-style",
  "border-color",
  "inset",
  "scroll-margin",
  "scroll-padding",
];

const SHADOW_PROPERTIES: &[&str] = &["box-shadow", "text-shadow"];

#[derive(Default)]
struct Mirror {
  ignore_next: bool,
}

impl CssVisitor for Mirror {
  fn comment(&mut self, text: &str) {
    if text.contains("rtl:ignore") {
      self.ignore_next = true;
    }
  }

  fn enter_block(&mut self) {
    self.ignore_next = false;
  }

  fn exit_block(&mut self) {
    self.ignore_next = false;
  }

  fn declaration(&mut self, d: &Declaration<'_>) -> Vec<String> {
    if std::mem::take(&mut self.ignore_next) || d.property.starts_with("--") {
      return vec![d.render(d.property, d.value)];
    }

    let property = flip_property(&d.property_name());
    let (value, important) = d.split_important();
    let value = flip_value(&property, value);
    vec![d.render(&property, &format!("{}{}", value, important))]
  }
}

/// Produce the right-to-left variant of a stylesheet.
///
/// A `/* rtl:ignore */` comment keeps the next declaration unchanged; custom
/// properties are never touched.
pub fn mirror_rtl(css: &str) -> String {
  walk(css, &mut Mirror::default())
}

fn flip_property(property: &str) -> String {
  property
    .split('-')
    .map(|part| match part {
      "left" => "right",
      "right" => "left",
      other => other,
    })
    .collect::<Vec<_>>()
    .join("-")
}

fn flip_value(property: &str, value: &str) -> String {
  if property == "direction" {
    return swap_words(value, "ltr", "rtl");
  }
  if KEYWORD_PROPERTIES.contains(&property) {
    return swap_words(value, "left", "right");
  }
  if BOX_SHORTHANDS.contains(&property) {
    return flip_box(value);
  }
  if property == "border-radius" {
    return flip_radius(value);
  }
  if SHADOW_PROPERTIES.contains(&property) {
    return flip_shadows(value);
  }
  value.to_string()
}

fn swap_words(value: &str, a: &str, b: &str) -> String {
  split_tokens(value)
    .into_iter()
    .map(|token| {
      if token.eq_ignore_ascii_case(a) {
        b
      } else if token.eq_ignore_ascii_case(b) {
        a
      } else {
        token
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// `top right bottom left` becomes `top left bottom right`.
fn flip_box(value: &str) -> String {
  let tokens = split_tokens(value);
  match tokens.as_slice() {
    [top, right, bottom, left] => format!("{} {} {} {}", top, left, bottom, right),
    _ => value.to_string(),
  }
}

/// Corner order is top-left, top-right, bottom-right, bottom-left.
fn flip_radius(value: &str) -> String {
  value
    .split('/')
    .map(|part| {
      let tokens = split_tokens(part);
      match tokens.as_slice() {
        [tl, tr, br, bl] => format!("{} {} {} {}", tr, tl, bl, br),
        [tl, tr_bl, br] => format!("{} {} {} {}", tr_bl, tl, tr_bl, br),
        [tl_br, tr_bl] => format!("{} {}", tr_bl, tl_br),
        _ => part.trim().to_string(),
      }
    })
    .collect::<Vec<_>>()
    .join(" / ")
}

/// Negate the horizontal offset of every shadow in the list.
fn flip_shadows(value: &str) -> String {
  split_commas(value)
    .into_iter()
    .map(|shadow| {
      let mut negated = false;
      split_tokens(shadow)
        .into_iter()
        .map(|token| {
          if !negated && starts_numeric(token) {
            negated = true;
            negate(token)
          } else {
            token.to_string()
          }
        })
        .collect::<Vec<_>>()
        .join(" ")
    })
    .collect::<Vec<_>>()
    .join(", ")
}

fn starts_numeric(token: &str) -> bool {
  let body = token.strip_prefix('-').unwrap_or(token);
  body.starts_with(|c: char| c.is_ascii_digit() || c == '.')
}

fn negate(token: &str) -> String {
  if let Some(positive) = token.strip_prefix('-') {
    return positive.to_string();
  }
  if token.trim_start_matches(['0', '.']).chars().next().is_none_or(|c| !c.is_ascii_digit()) {
    // Zero in any unit stays zero.
    return token.to_string();
  }
  format!("-{}", token)
}
