//! Machine identity from the DMI sysfs directory.

use std::fs;
use std::path::Path;
use tracing::warn;

/// Hardware model information.
///
/// The `profile_*` fields are lower-cased and path safe; they name profile
/// files. The other fields are the raw firmware strings for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelInfo {
    /// Board vendor, e.g. "LENOVO".
    pub vendor: String,
    /// Product version, e.g. "ThinkPad T61".
    pub name: String,
    /// Product name (machine type), e.g. "7664WM7".
    pub id: String,
    /// Normalized vendor and version, e.g. "lenovo_thinkpad_t61".
    pub profile_name: String,
    /// Normalized vendor and machine type, e.g. "lenovo_7664wm7".
    pub profile_id: String,
}

impl ModelInfo {
    /// Builds model information from the three firmware strings.
    pub fn new(vendor: &str, product: &str, version: &str) -> Self {
        let vendor = vendor.trim();
        let product = product.trim();
        let version = version.trim();
        Self {
            vendor: vendor.to_string(),
            name: version.to_string(),
            id: product.to_string(),
            profile_name: path_safe(&format!("{}_{}", vendor, version)),
            profile_id: path_safe(&format!("{}_{}", vendor, product)),
        }
    }

    /// Reads `board_vendor`, `product_name` and `product_version` from `dir`.
    ///
    /// Falls back to empty strings if any of them cannot be read.
    pub fn read(dir: &Path) -> Self {
        let field = |name: &str| fs::read_to_string(dir.join(name));
        match (
            field("board_vendor"),
            field("product_name"),
            field("product_version"),
        ) {
            (Ok(vendor), Ok(product), Ok(version)) => Self::new(&vendor, &product, &version),
            (vendor, product, version) => {
                let e = [vendor.err(), product.err(), version.err()]
                    .into_iter()
                    .flatten()
                    .next();
                warn!(
                    "Unable to read system model from {}: {:?}",
                    dir.display(),
                    e
                );
                Self::default()
            }
        }
    }
}

/// Lower-cases `s` and replaces path separators and whitespace.
fn path_safe(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| match c {
            '/' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
