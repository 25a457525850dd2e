//! Crew definition files, standing in for an external crew store.

use std::collections::BTreeMap;
use std::path::Path;

use crewline_core::api::Crew;

use crate::error::CliError;

/// Parse a crew from `.json`, or TOML for any other extension.
pub fn load_crew_file(path: &Path) -> Result<Crew, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::CrewFile(format!("{}: {e}", path.display())))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text)
            .map_err(|e| CliError::CrewFile(format!("{}: {e}", path.display())))
    } else {
        toml::from_str(&text).map_err(|e| CliError::CrewFile(format!("{}: {e}", path.display())))
    }
}

/// Every `.toml`/`.json` crew in `dir`, sorted by file name.
pub fn load_crews_dir(dir: &Path) -> Result<Vec<Crew>, CliError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if path.is_file() && matches!(ext, "toml" | "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut crews = Vec::with_capacity(paths.len());
    for path in paths {
        let crew = load_crew_file(&path)?;
        tracing::debug!(crew_id = %crew.id, path = %path.display(), "crew loaded");
        crews.push(crew);
    }
    Ok(crews)
}

/// `KEY=VALUE` pairs; later keys win.
pub fn parse_input_vars(pairs: &[String]) -> Result<BTreeMap<String, String>, CliError> {
    let mut vars = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Command(format!(
                "invalid input '{pair}', expected KEY=VALUE"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(CliError::Command(format!("invalid input '{pair}', empty key")));
        }
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
