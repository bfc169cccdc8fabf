//! Runs the defaults generator over the fixture schema.

use common::SchemaRegistry;
use forge::GeneratorConfig;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=schema/fixture.json");

    let registry = SchemaRegistry::load_all(&["schema/fixture.json"])?;
    let config = GeneratorConfig {
        well_known_path: "crate::wkt".to_string(),
        ..GeneratorConfig::default()
    };

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    for file in forge::generate_files(&registry, &config)? {
        std::fs::write(out_dir.join(&file.name), &file.content)?;
    }
    Ok(())
}
