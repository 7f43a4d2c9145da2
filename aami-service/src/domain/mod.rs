//! The core: policy resolution, the rule-file pipeline, bootstrap-token admission, the
//! job core, and the service-discovery projection (§2, §4). Persistence is abstracted
//! behind the [`repositories`] traits; every domain service is written against those
//! traits rather than a concrete store.

pub mod dynamic_value;
pub mod engine_client;
pub mod job_core;
pub mod memory_store;
pub mod merge;
pub mod model;
pub mod repositories;
pub mod resolver;
pub mod rule_file_manager;
pub mod rule_generator;
pub mod sd_projection;
pub mod template_engine;
pub mod token_admission;

pub use engine_client::EngineClient;
pub use job_core::JobManager;
pub use resolver::{EffectiveAlertRule, EffectiveCheck, PolicyResolver};
pub use rule_file_manager::RuleFileManager;
pub use rule_generator::RuleGenerator;
pub use sd_projection::SdProjection;
pub use token_admission::TokenAdmissionService;

use sha2::{Digest, Sha256};

/// Hashes a script's content for integrity tracking (§3: `ScriptTemplate::verify_hash`).
/// Hex-encoded SHA-256, matching the format scripts are stored and compared in.
pub fn hash_script_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_script_content_is_deterministic() {
        assert_eq!(hash_script_content("echo hi"), hash_script_content("echo hi"));
    }

    #[test]
    fn test_hash_script_content_differs_on_change() {
        assert_ne!(hash_script_content("echo hi"), hash_script_content("echo bye"));
    }

    #[test]
    fn test_hash_script_content_is_known_sha256() {
        assert_eq!(
            hash_script_content(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
