use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Label inserted between the input's stem and the timestamp.
pub const VARIANT_TAG: &str = "dabby";

/// `<stem>_dabby_<timestamp>.mid`
pub fn variant_file_name(input: &Path, timestamp: &str) -> Result<String> {
    let Some(stem) = input.file_stem().and_then(|stem| stem.to_str()) else {
        bail!("Input path {} has no usable file name.", input.display());
    };
    if timestamp.is_empty() {
        bail!("Variant timestamp must not be empty.");
    }
    Ok(format!("{stem}_{VARIANT_TAG}_{timestamp}.mid"))
}

/// Places the variant in `output_dir`, or next to the input when none is given.
pub fn variant_path(input: &Path, output_dir: Option<&Path>, timestamp: &str) -> Result<PathBuf> {
    let name = variant_file_name(input, timestamp)?;
    let dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(name))
}
