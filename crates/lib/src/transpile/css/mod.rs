//! Stylesheet post-processing.
//!
//! A small rule walker splits CSS into selector/at-rule preludes, declarations
//! and comments, and hands them to a [`CssVisitor`]. Vendor prefixing, RTL
//! mirroring and CSS-module class scoping are all visitors over the same walk,
//! so none of them needs a full CSS parser.

pub mod modules;
pub mod prefix;
pub mod rtl;

pub use modules::{ScopedStylesheet, scope_css_module};
pub use prefix::add_vendor_prefixes;
pub use rtl::mirror_rtl;

/// A `property: value` declaration, keeping the surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration<'a> {
  leading: &'a str,
  pub property: &'a str,
  separator: &'a str,
  pub value: &'a str,
  trailing: &'a str,
}

impl<'a> Declaration<'a> {
  /// Split raw declaration text. Returns `None` for text without a `:`.
  pub fn parse(raw: &'a str) -> Option<Self> {
    let colon = raw.find(':')?;
    let (head, tail) = (&raw[..colon], &raw[colon + 1..]);

    let property_start = head.len() - head.trim_start().len();
    let property = head.trim();
    if property.is_empty() {
      return None;
    }
    let leading = &head[..property_start];

    let value_trimmed_start = tail.trim_start();
    let value = value_trimmed_start.trim_end();
    let separator_len = colon + 1 + (tail.len() - value_trimmed_start.len()) - (property_start + property.len());
    let separator = &raw[property_start + property.len()..property_start + property.len() + separator_len];
    let trailing = &value_trimmed_start[value.len()..];

    Some(Self {
      leading,
      property,
      separator,
      value,
      trailing,
    })
  }

  /// Render with a different property and value, keeping the original spacing.
  pub fn render(&self, property: &str, value: &str) -> String {
    format!("{}{}{}{}{}", self.leading, property, self.separator, value, self.trailing)
  }

  /// Render an additional declaration placed before this one.
  ///
  /// Trailing whitespace stays with the original declaration only.
  pub fn render_copy(&self, property: &str, value: &str) -> String {
    format!("{}{}{}{}", self.leading, property, self.separator, value)
  }

  /// Lowercased property name.
  pub fn property_name(&self) -> String {
    self.property.to_ascii_lowercase()
  }

  /// Split `value` into its main part and a trailing `!important`, if any.
  pub fn split_important(&self) -> (&'a str, &'a str) {
    let lower = self.value.to_ascii_lowercase();
    match lower.rfind("!important") {
      Some(idx) if lower[idx..].trim() == "!important" => {
        let main = &self.value[..idx];
        let trimmed = main.trim_end();
        (trimmed, &self.value[trimmed.len()..])
      }
      _ => (self.value, ""),
    }
  }
}

/// Callbacks for [`walk`]. Every method has a pass-through default.
pub trait CssVisitor {
  /// Rewrite a rule selector (never called for at-rule preludes).
  fn selector(&mut self, prelude: &str) -> String {
    prelude.to_string()
  }

  /// Replace one declaration with zero or more declarations (without `;`).
  fn declaration(&mut self, declaration: &Declaration<'_>) -> Vec<String> {
    vec![declaration.render(declaration.property, declaration.value)]
  }

  fn comment(&mut self, _text: &str) {}

  fn enter_block(&mut self) {}

  fn exit_block(&mut self) {}
}

/// Walk `css`, applying `visitor`, and return the rewritten stylesheet.
pub fn walk(css: &str, visitor: &mut impl CssVisitor) -> String {
  let mut out = String::with_capacity(css.len());
  let mut buf = String::new();
  let mut depth = 0usize;
  let mut parens = 0usize;
  let mut chars = css.char_indices().peekable();

  while let Some((idx, ch)) = chars.next() {
    match ch {
      '/' if css[idx..].starts_with("/*") => {
        let end = css[idx + 2..].find("*/").map(|e| idx + 2 + e + 2).unwrap_or(css.len());
        let comment = &css[idx..end];
        if buf.trim().is_empty() {
          out.push_str(&buf);
          buf.clear();
          out.push_str(comment);
        } else {
          buf.push_str(comment);
        }
        visitor.comment(comment);
        while chars.peek().is_some_and(|(i, _)| *i < end) {
          chars.next();
        }
      }
      '"' | '\'' => {
        buf.push(ch);
        let mut escaped = false;
        for (_, c) in chars.by_ref() {
          buf.push(c);
          if escaped {
            escaped = false;
          } else if c == '\\' {
            escaped = true;
          } else if c == ch {
            break;
          }
        }
      }
      '(' => {
        parens += 1;
        buf.push(ch);
      }
      ')' => {
        parens = parens.saturating_sub(1);
        buf.push(ch);
      }
      '{' if parens == 0 => {
        if buf.trim_start().starts_with('@') {
          out.push_str(&buf);
        } else {
          out.push_str(&visitor.selector(&buf));
        }
        buf.clear();
        out.push('{');
        depth += 1;
        visitor.enter_block();
      }
      ';' if parens == 0 => {
        flush_statement(&mut out, &buf, depth, visitor);
        out.push(';');
        buf.clear();
      }
      '}' if parens == 0 => {
        flush_statement(&mut out, &buf, depth, visitor);
        buf.clear();
        out.push('}');
        if depth > 0 {
          depth -= 1;
          visitor.exit_block();
        }
      }
      _ => buf.push(ch),
    }
  }

  out.push_str(&buf);
  out
}

fn flush_statement(out: &mut String, buf: &str, depth: usize, visitor: &mut impl CssVisitor) {
  if buf.trim().is_empty() || depth == 0 || buf.trim_start().starts_with('@') {
    out.push_str(buf);
    return;
  }

  match Declaration::parse(buf) {
    Some(declaration) => out.push_str(&visitor.declaration(&declaration).join(";")),
    None => out.push_str(buf),
  }
}

/// Split a value on top-level whitespace, keeping parenthesized groups intact.
pub(crate) fn split_tokens(value: &str) -> Vec<&str> {
  split_top_level(value, |c| c.is_whitespace())
}

/// Split a value on top-level commas.
pub(crate) fn split_commas(value: &str) -> Vec<&str> {
  split_top_level(value, |c| c == ',')
    .into_iter()
    .map(str::trim)
    .collect()
}

fn split_top_level(value: &str, is_separator: impl Fn(char) -> bool) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut start = None;

  for (idx, ch) in value.char_indices() {
    match ch {
      '(' => depth += 1,
      ')' => depth = depth.saturating_sub(1),
      _ => {}
    }
    if depth == 0 && is_separator(ch) {
      if let Some(s) = start.take() {
        parts.push(&value[s..idx]);
      }
    } else if start.is_none() {
      start = Some(idx);
    }
  }
  if let Some(s) = start {
    parts.push(&value[s..]);
  }
  parts
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Upper;

  impl CssVisitor for Upper {
    fn declaration(&mut self, d: &Declaration<'_>) -> Vec<String> {
      vec![d.render(d.property, &d.value.to_uppercase())]
    }
  }

  #[test]
  fn declaration_keeps_spacing() {
    let d = Declaration::parse("\n  color :  red  ").unwrap();
    assert_eq!(d.property, "color");
    assert_eq!(d.value, "red");
    assert_eq!(d.render("background", "blue"), "\n  background :  blue  ");
  }

  #[test]
  fn split_important_suffix() {
    let d = Declaration::parse("float: left !important").unwrap();
    assert_eq!(d.split_important(), ("left", " !important"));
    let d = Declaration::parse("float: left").unwrap();
    assert_eq!(d.split_important(), ("left", ""));
  }

  #[test]
  fn identity_walk_preserves_text() {
    let css = "/* head */\n@media (min-width: 600px) {\n  .a:hover, .b { color: red; background: url(\"x;y.png\") }\n}\n@import 'x.css';\n";
    struct Noop;
    impl CssVisitor for Noop {}
    assert_eq!(walk(css, &mut Noop), css);
  }

  #[test]
  fn declarations_are_visited_but_not_selectors() {
    let css = "a:hover { color: red; margin: 0 }";
    assert_eq!(walk(css, &mut Upper), "a:hover { color: RED; margin: 0 }");
  }

  #[test]
  fn data_uri_semicolons_are_not_boundaries() {
    let css = ".a { background: url(data:image/png;base64,AAA) }";
    assert_eq!(walk(css, &mut Upper), ".a { background: URL(DATA:IMAGE/PNG;BASE64,AAA) }");
  }

  #[test]
  fn token_splitting_respects_parens() {
    assert_eq!(split_tokens("calc(1px + 2px) 3px  4px"), vec!["calc(1px + 2px)", "3px", "4px"]);
    assert_eq!(split_commas("0 1px red, inset 0 0 rgba(0, 0, 0, .5)"), vec!["0 1px red", "inset 0 0 rgba(0, 0, 0, .5)"]);
  }
}
