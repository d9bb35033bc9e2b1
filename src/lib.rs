pub mod assembler;
pub mod ast;
pub mod config;
pub mod error;
pub mod generator;
pub mod infer;
pub mod ir;
pub mod mapping;
pub mod pipeline;
pub mod report;
pub mod sql;

use wasm_bindgen::prelude::*;

use config::ProfileSet;
use generator::EmitterRegistry;
use mapping::TargetKey;
use pipeline::{GenerationRequest, Pipeline};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Generate projects for comma-separated `lang/fw` targets. Returns the
/// file sets, dependency pins and diagnostics as JSON.
#[wasm_bindgen(js_name = "generateProject")]
pub fn generate_project(ddl: &str, targets: &str, name: Option<String>) -> Result<String, String> {
    let targets = targets
        .split([',', ' '])
        .filter(|t| !t.is_empty())
        .map(str::parse::<TargetKey>)
        .collect::<Result<Vec<_>, _>>()?;

    let profiles = ProfileSet::builtin().map_err(|e| e.to_string())?;
    let pipeline = Pipeline::new(profiles, EmitterRegistry::builtin());
    let request = GenerationRequest {
        targets,
        ..GenerationRequest::new(ddl, name.unwrap_or_else(|| "app".to_string()))
    };

    let output = pipeline.run(&request).map_err(|e| e.to_string())?;
    output.to_json().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_project_json() {
        let json = generate_project(
            "CREATE TABLE notes (id INT PRIMARY KEY, body TEXT);",
            "rust/axum, python-flask",
            Some("notes".to_string()),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["targets"]["rust/axum"].is_object());
        assert!(value["targets"]["python/flask"].is_object());
    }

    #[test]
    fn test_generate_project_rejects_bad_target() {
        assert!(generate_project("CREATE TABLE t (id INT);", "axum", None).is_err());
    }
}
