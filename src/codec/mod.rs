//! Identifier Codec: compound field and object identifiers
//!
//! A single opaque string can name:
//! - **a plain field**: `email`
//! - **a field inside a repeated list**: `sku@lines` (`field LIST_SEP list`)
//! - **a reference to an object**: `42::contact` (`id ID_SEP type`)
//!
//! Wrappers may nest in either position, e.g. `42::contact@lines`.
//!
//! ## Matching Rules
//!
//! A wrapper matches only when its separator occurs exactly once. Zero or
//! several occurrences leave the string unwrapped at that layer, so every
//! projection is total.
//!
//! ## Base Type
//!
//! `base_type` peels at most one list wrapper, then at most one id wrapper:
//!
//! ```text
//! "id::object@list"  --list-->  "id::object"  --id-->  "object"
//! ```
//!
//! Peeling in the other order would give a different answer for nested
//! strings; the order is part of the format.

use std::fmt;

/// Separator between a field and the list it lives in
pub const LIST_SEP: &str = "@";

/// Separator between an object id and its object type
pub const ID_SEP: &str = "::";

/// Decoded `field@list`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListField<'a> {
    pub field_name: &'a str,
    pub list_name: &'a str,
}

/// Decoded `id::type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRef<'a> {
    pub object_id: &'a str,
    pub object_type: &'a str,
}

/// Outermost wrapper of an identifier string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    Plain(&'a str),
    ListField(ListField<'a>),
    IdRef(IdRef<'a>),
}

impl fmt::Display for Identifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Plain(name) => f.write_str(name),
            Identifier::ListField(lf) => write!(f, "{}{}{}", lf.field_name, LIST_SEP, lf.list_name),
            Identifier::IdRef(r) => write!(f, "{}{}{}", r.object_id, ID_SEP, r.object_type),
        }
    }
}

/// Split `s` on `sep`, matching only when exactly two parts result
fn split_exactly_two<'a>(s: &'a str, sep: &str) -> Option<(&'a str, &'a str)> {
    let mut parts = s.split(sep);
    let first = parts.next()?;
    let second = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, second))
}

pub fn split_list<'a>(s: impl Into<Option<&'a str>>) -> Option<ListField<'a>> {
    let (field_name, list_name) = split_exactly_two(s.into()?, LIST_SEP)?;
    Some(ListField { field_name, list_name })
}

pub fn split_id<'a>(s: impl Into<Option<&'a str>>) -> Option<IdRef<'a>> {
    let (object_id, object_type) = split_exactly_two(s.into()?, ID_SEP)?;
    Some(IdRef { object_id, object_type })
}

// Projections map `""` to `""` rather than to a failed match
fn project<'a>(s: Option<&'a str>, part: impl FnOnce(&'a str) -> Option<&'a str>) -> Option<&'a str> {
    match s? {
        "" => Some(""),
        s => part(s),
    }
}

pub fn field_name<'a>(s: impl Into<Option<&'a str>>) -> Option<&'a str> {
    project(s.into(), |s| split_list(s).map(|lf| lf.field_name))
}

pub fn list_name<'a>(s: impl Into<Option<&'a str>>) -> Option<&'a str> {
    project(s.into(), |s| split_list(s).map(|lf| lf.list_name))
}

pub fn object_id<'a>(s: impl Into<Option<&'a str>>) -> Option<&'a str> {
    project(s.into(), |s| split_id(s).map(|r| r.object_id))
}

pub fn object_type<'a>(s: impl Into<Option<&'a str>>) -> Option<&'a str> {
    project(s.into(), |s| split_id(s).map(|r| r.object_type))
}

/// Canonical leaf name: peel one list wrapper, then one id wrapper.
///
/// `None` maps to `None`; every string (including `""`) maps to `Some`.
pub fn base_type<'a>(s: impl Into<Option<&'a str>>) -> Option<&'a str> {
    let s = s.into()?;
    let t = split_list(s).map_or(s, |lf| lf.field_name);
    Some(split_id(t).map_or(t, |r| r.object_type))
}

/// Typed view of the outermost wrapper.
///
/// A string matching both wrappers at the top level is reported as a list
/// field, consistent with the peel order of [`base_type`].
pub fn decode(s: &str) -> Identifier<'_> {
    if let Some(lf) = split_list(s) {
        return Identifier::ListField(lf);
    }
    if let Some(r) = split_id(s) {
        return Identifier::IdRef(r);
    }
    Identifier::Plain(s)
}

/// `field_id@list_name`
pub fn encode_list_field(field_id: &str, list_name: &str) -> String {
    format!("{field_id}{LIST_SEP}{list_name}")
}

/// `identifier::object_type`
pub fn encode_id(identifier: &str, object_type: &str) -> String {
    format!("{identifier}{ID_SEP}{object_type}")
}
