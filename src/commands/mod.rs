pub mod apply;
pub mod drift;
pub mod plan;
pub mod validate;

use anyhow::{Context, Result};
use fabric::FabricSpec;
use std::fs;
use std::path::Path;

/// Load a fabric spec from a TOML file.
pub fn load_spec(path: &Path) -> Result<FabricSpec> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read spec {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid spec format in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_SPEC: &str = r#"
id = "demo"

[[server_classes]]
name = "web"
count = 16

[leaf]
model = "leaf-48"
port_count = 48
port_speed_gbps = 100
downlink_speed_gbps = 25
units_per_leaf = 8

[spine]
model = "spine-32"
port_count = 32
port_speed_gbps = 100
"#;

    #[test]
    fn minimal_toml_spec_parses_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fabric.toml");
        fs::write(&path, MINIMAL_SPEC).unwrap();

        let spec = load_spec(&path).unwrap();
        assert_eq!(spec.id, "demo");
        assert_eq!(spec.name_template, "{fabric}-{role}-{index}");
        assert_eq!(spec.index_width, 2);
        assert_eq!(spec.server_total(), 16);
    }

    #[test]
    fn missing_spec_file_is_a_readable_error() {
        let err = load_spec(Path::new("/nonexistent/fabric.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("fabric.toml"));
    }
}
