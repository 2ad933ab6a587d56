//! Vendor prefixing for the supported browser range.

use std::collections::HashSet;

use super::{CssVisitor, Declaration, walk};

/// Properties still needing a `-webkit-` copy.
const WEBKIT_PROPERTIES: &[&str] = &[
  "appearance",
  "backdrop-filter",
  "box-decoration-break",
  "hyphens",
  "mask",
  "mask-image",
  "mask-position",
  "mask-repeat",
  "mask-size",
  "text-size-adjust",
  "user-select",
];

/// `(property, value)` pairs whose value needs a `-webkit-` copy.
const WEBKIT_VALUES: &[(&str, &str)] = &[("position", "sticky")];

/// Key of a declaration that already carries a `-webkit-` prefix.
fn prefixed_key(d: &Declaration<'_>) -> Option<String> {
  let property = d.property_name();
  if property.starts_with("-webkit-") {
    return Some(format!("{}:", property));
  }
  let value = d.split_important().0.to_ascii_lowercase();
  value.starts_with("-webkit-").then(|| format!("{}:{}", property, value))
}

/// First pass: the prefixed declarations each block already has, in block order.
#[derive(Default)]
struct ExistingPrefixes {
  blocks: Vec<HashSet<String>>,
  open: Vec<usize>,
}

impl CssVisitor for ExistingPrefixes {
  fn enter_block(&mut self) {
    self.open.push(self.blocks.len());
    self.blocks.push(HashSet::new());
  }

  fn exit_block(&mut self) {
    self.open.pop();
  }

  fn declaration(&mut self, d: &Declaration<'_>) -> Vec<String> {
    if let Some(key) = prefixed_key(d)
      && let Some(&block) = self.open.last()
    {
      self.blocks[block].insert(key);
    }
    vec![d.render(d.property, d.value)]
  }
}

struct Prefixer {
  existing: Vec<HashSet<String>>,
  next_block: usize,
  /// Prefixed declarations present or emitted, per open block.
  seen: Vec<HashSet<String>>,
}

impl Prefixer {
  fn new(existing: Vec<HashSet<String>>) -> Self {
    Self {
      existing,
      next_block: 0,
      seen: Vec::new(),
    }
  }

  fn remember(&mut self, key: String) -> bool {
    match self.seen.last_mut() {
      Some(block) => block.insert(key),
      None => true,
    }
  }
}

impl CssVisitor for Prefixer {
  fn enter_block(&mut self) {
    let block = self.existing.get_mut(self.next_block).map(std::mem::take).unwrap_or_default();
    self.next_block += 1;
    self.seen.push(block);
  }

  fn exit_block(&mut self) {
    self.seen.pop();
  }

  fn declaration(&mut self, d: &Declaration<'_>) -> Vec<String> {
    let original = d.render(d.property, d.value);
    if prefixed_key(d).is_some() {
      return vec![original];
    }

    let property = d.property_name();
    if WEBKIT_PROPERTIES.contains(&property.as_str()) {
      let prefixed = format!("-webkit-{}", property);
      if self.remember(format!("{}:", prefixed)) {
        return vec![d.render_copy(&prefixed, d.value), original];
      }
      return vec![original];
    }

    let (value, important) = d.split_important();
    let value_lower = value.to_ascii_lowercase();
    if WEBKIT_VALUES.iter().any(|(p, v)| *p == property && *v == value_lower) {
      let prefixed_value = format!("-webkit-{}", value_lower);
      if self.remember(format!("{}:{}", property, prefixed_value)) {
        return vec![d.render_copy(d.property, &format!("{}{}", prefixed_value, important)), original];
      }
    }

    vec![original]
  }
}

/// Add `-webkit-` prefixed copies of declarations that still need them.
///
/// A block that already has the prefixed declaration, before or after the
/// unprefixed one, gets no second copy.
pub fn add_vendor_prefixes(css: &str) -> String {
  let mut existing = ExistingPrefixes::default();
  walk(css, &mut existing);
  walk(css, &mut Prefixer::new(existing.blocks))
}
