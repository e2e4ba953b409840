//! Core data types for extracted translation units.

use serde::Serialize;

use crate::config::{TRANS_UNIT_TAG, UNIT_TAG, XLIFF_1_2_NS, XLIFF_2_0_NS};

/// One translation unit, as extracted from the document.
///
/// `id` and `source` are never empty. `target` is `None` when the unit has
/// no `<target>` element and `Some("")` when the element is present but empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRecord {
    pub id: String,
    pub source: String,
    pub target: Option<String>,
    /// 1-based line of the unit's opening tag in the original document.
    pub line: usize,
}

/// XLIFF version context, derived from the namespace of a unit element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XliffVersion {
    /// No namespace.
    V1_0,
    /// `urn:oasis:names:tc:xliff:document:1.2`
    V1_2,
    /// `urn:oasis:names:tc:xliff:document:2.0`
    V2_0,
}

impl XliffVersion {
    /// Map a resolved namespace to a supported version.
    ///
    /// `None` (and the empty namespace) means XLIFF 1.0. Any other URI is
    /// foreign and yields `None`.
    ///
    /// # Examples
    /// ```
    /// use xliff_streaming::types::XliffVersion;
    ///
    /// assert_eq!(XliffVersion::from_namespace(None), Some(XliffVersion::V1_0));
    /// assert_eq!(
    ///     XliffVersion::from_namespace(Some("urn:oasis:names:tc:xliff:document:2.0")),
    ///     Some(XliffVersion::V2_0)
    /// );
    /// assert_eq!(XliffVersion::from_namespace(Some("http://example.com/other")), None);
    /// ```
    pub fn from_namespace(uri: Option<&str>) -> Option<Self> {
        match uri {
            None | Some("") => Some(XliffVersion::V1_0),
            Some(XLIFF_1_2_NS) => Some(XliffVersion::V1_2),
            Some(XLIFF_2_0_NS) => Some(XliffVersion::V2_0),
            Some(_) => None,
        }
    }

    /// Same as [`XliffVersion::from_namespace`], for raw namespace bytes.
    pub fn from_namespace_bytes(uri: Option<&[u8]>) -> Option<Self> {
        match uri {
            None => Self::from_namespace(None),
            Some(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| Self::from_namespace(Some(s))),
        }
    }

    /// The namespace URI for this version, `None` for 1.0.
    pub fn namespace(self) -> Option<&'static str> {
        match self {
            XliffVersion::V1_0 => None,
            XliffVersion::V1_2 => Some(XLIFF_1_2_NS),
            XliffVersion::V2_0 => Some(XLIFF_2_0_NS),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            XliffVersion::V1_0 => "1.0",
            XliffVersion::V1_2 => "1.2",
            XliffVersion::V2_0 => "2.0",
        }
    }
}

/// Which unit-boundary element form was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitTag {
    /// `<trans-unit>` (XLIFF 1.x)
    TransUnit,
    /// `<unit>` (XLIFF 2.0)
    Unit,
}

impl UnitTag {
    pub fn from_local_name(name: &[u8]) -> Option<Self> {
        if name == TRANS_UNIT_TAG.as_bytes() {
            Some(UnitTag::TransUnit)
        } else if name == UNIT_TAG.as_bytes() {
            Some(UnitTag::Unit)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitTag::TransUnit => TRANS_UNIT_TAG,
            UnitTag::Unit => UNIT_TAG,
        }
    }
}
