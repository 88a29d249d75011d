//! Required fields of the output feature types.

use aip_document::Document;

/// `(feature type, required fields)` of every type the built-in regions
/// produce.
pub const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("Airport", &["name", "latitude", "longitude"]),
    ("Service", &["airport", "service"]),
];

/// Declares [`REQUIRED_FIELDS`] on `document`.
pub fn require_fields(document: &mut Document) {
    for (kind, fields) in REQUIRED_FIELDS {
        document.require(kind, fields);
    }
}
