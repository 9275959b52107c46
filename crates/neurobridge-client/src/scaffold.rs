//! Contract scaffolding
//!
//! Persists the policy-facing contract view into a project directory so
//! policy authors can code against stable identifiers:
//!
//! - `_contract.json` — the stable view, canonical JSON
//! - `_contract.digest` — hex blake3 of the stable view
//! - `contract_ids.rs` — generated constants (layer ids, feedback ids,
//!   window sizes) for inclusion in policy crates
//!
//! All three files are machine-owned and rewritten on every sync where the
//! contract actually changed. If the digest matches what is already on disk
//! nothing is touched, so repeated syncs are cheap and diffs stay honest.
//! When the digest changes, the project graph changed — policy code
//! referencing removed ids needs attention.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use neurobridge_core::contract::ContractSnapshot;

/// Machine-owned stable-view file.
pub const MACHINE_OWNED_JSON: &str = "_contract.json";
/// Machine-owned digest file.
pub const MACHINE_OWNED_DIGEST: &str = "_contract.digest";
/// Generated Rust module with id constants.
pub const MACHINE_OWNED_IDS: &str = "contract_ids.rs";

/// Scaffolding errors.
#[derive(Debug, Error)]
pub enum ScaffoldError {
    /// Filesystem failure.
    #[error("scaffold io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for scaffold operations.
pub type ScaffoldResult<T> = Result<T, ScaffoldError>;

/// What a sync did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaffoldOutcome {
    /// False when the on-disk digest already matched and nothing was written.
    pub wrote: bool,
    /// Digest of the (possibly freshly written) contract view.
    pub digest: String,
}

/// Write the contract artifacts into `dir`, skipping when unchanged.
///
/// # Errors
///
/// Returns [`ScaffoldError`] on filesystem failure.
pub fn sync_contract(dir: &Path, snapshot: &ContractSnapshot) -> ScaffoldResult<ScaffoldOutcome> {
    let digest = snapshot.digest();

    let digest_path = dir.join(MACHINE_OWNED_DIGEST);
    if let Ok(existing) = fs::read_to_string(&digest_path) {
        if existing.trim() == digest {
            info!(digest = %digest, "contract unchanged; scaffold untouched");
            return Ok(ScaffoldOutcome {
                wrote: false,
                digest,
            });
        }
    }

    fs::create_dir_all(dir)?;
    fs::write(dir.join(MACHINE_OWNED_JSON), snapshot.stable_json())?;
    fs::write(&digest_path, format!("{digest}\n"))?;
    fs::write(dir.join(MACHINE_OWNED_IDS), render_ids(snapshot, &digest))?;

    info!(dir = %dir.display(), digest = %digest, "contract scaffold written");
    Ok(ScaffoldOutcome { wrote: true, digest })
}

fn render_ids(snapshot: &ContractSnapshot, digest: &str) -> String {
    let mut out = String::new();
    out.push_str("// AUTO-GENERATED FILE. DO NOT EDIT.\n");
    out.push_str("//\n");
    out.push_str("// Machine-owned; overwritten on every contract sync. Gives policy code\n");
    out.push_str("// the stable ids it needs: layers for per-layer reward, feedback ids for\n");
    out.push_str("// per-channel deviation. If this file changed, the project graph changed.\n\n");

    out.push_str(&format!("pub const CONTRACT_DIGEST: &str = \"{digest}\";\n\n"));
    out.push_str(&format!(
        "pub const OUTPUT_WINDOW: usize = {};\n",
        snapshot.constants.output_window
    ));
    out.push_str(&format!(
        "pub const FEEDBACK_WINDOW: usize = {};\n\n",
        snapshot.constants.feedback_window
    ));

    out.push_str("pub const LAYER_IDS: &[&str] = &[\n");
    for id in &snapshot.contract.layer_ids {
        out.push_str(&format!("    \"{id}\",\n"));
    }
    out.push_str("];\n\n");

    out.push_str("pub const FEEDBACK_IDS: &[&str] = &[\n");
    for id in &snapshot.contract.feedback_ids {
        out.push_str(&format!("    \"{id}\",\n"));
    }
    out.push_str("];\n");

    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use neurobridge_core::contract::Contract;
    use neurobridge_core::types::RunConstants;

    fn snapshot(layers: &[&str]) -> ContractSnapshot {
        ContractSnapshot {
            constants: RunConstants {
                output_window: 8,
                feedback_window: 16,
            },
            contract: Contract {
                layer_ids: layers.iter().map(|s| (*s).to_string()).collect(),
                feedback_ids: BTreeSet::from(["fb0".to_string()]),
            },
        }
    }

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("neurobridge-scaffold-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_sync_writes_all_artifacts() {
        let dir = scratch_dir("write");
        let outcome = sync_contract(&dir, &snapshot(&["l1"])).unwrap();

        assert!(outcome.wrote);
        assert!(dir.join(MACHINE_OWNED_JSON).exists());
        assert!(dir.join(MACHINE_OWNED_DIGEST).exists());

        let ids = fs::read_to_string(dir.join(MACHINE_OWNED_IDS)).unwrap();
        assert!(ids.contains("pub const LAYER_IDS"));
        assert!(ids.contains("\"l1\""));
        assert!(ids.contains("pub const FEEDBACK_WINDOW: usize = 16;"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unchanged_contract_is_not_rewritten() {
        let dir = scratch_dir("skip");
        let first = sync_contract(&dir, &snapshot(&["l1"])).unwrap();
        let second = sync_contract(&dir, &snapshot(&["l1"])).unwrap();

        assert!(first.wrote);
        assert!(!second.wrote);
        assert_eq!(first.digest, second.digest);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_changed_contract_is_rewritten() {
        let dir = scratch_dir("change");
        let first = sync_contract(&dir, &snapshot(&["l1"])).unwrap();
        let second = sync_contract(&dir, &snapshot(&["l1", "l2"])).unwrap();

        assert!(second.wrote);
        assert_ne!(first.digest, second.digest);

        let ids = fs::read_to_string(dir.join(MACHINE_OWNED_IDS)).unwrap();
        assert!(ids.contains("\"l2\""));

        let _ = fs::remove_dir_all(&dir);
    }
}
