//! Post-install environment verification.
//!
//! Every required identifier is checked and every miss collected before
//! reporting, so one failed run shows the operator the complete
//! remediation list instead of the first missing package.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::backend::Backend;
use crate::error::Result;
use crate::profile::ExecutionContext;

/// One thing the finished environment must provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Present in the backend's installed-package list.
    CondaPackage(String),
    /// Importable by the environment's interpreter (covers pip installs,
    /// which the backend's package list does not see).
    PythonModule(String),
}

impl Requirement {
    /// Identifier shown in reports.
    pub fn id(&self) -> String {
        match self {
            Requirement::CondaPackage(name) => name.clone(),
            Requirement::PythonModule(name) => format!("{name} (import)"),
        }
    }
}

/// What the toolchain needs before a run can be declared usable.
pub fn default_requirements() -> Vec<Requirement> {
    vec![
        Requirement::CondaPackage("python".into()),
        Requirement::CondaPackage("jax".into()),
        Requirement::CondaPackage("jaxlib".into()),
        Requirement::CondaPackage("pdbfixer".into()),
        Requirement::PythonModule("jax".into()),
        Requirement::PythonModule("colabdesign".into()),
    ]
}

/// Terminal verification artifact. Success iff `missing` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub required: BTreeSet<String>,
    pub missing: BTreeSet<String>,
}

impl VerificationReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }

    /// Missing identifiers in stable order, for error messages.
    pub fn missing_list(&self) -> Vec<String> {
        self.missing.iter().cloned().collect()
    }
}

/// Check all requirements against the environment at `prefix`.
pub fn verify(
    backend: &dyn Backend,
    prefix: &Path,
    requirements: &[Requirement],
    ctx: &ExecutionContext,
) -> Result<VerificationReport> {
    let installed: BTreeSet<String> = backend
        .list_installed(prefix, ctx)?
        .into_iter()
        .map(|p| p.name)
        .collect();

    let mut required = BTreeSet::new();
    let mut missing = BTreeSet::new();

    for requirement in requirements {
        required.insert(requirement.id());
        let present = match requirement {
            Requirement::CondaPackage(name) => installed.contains(name),
            Requirement::PythonModule(name) => {
                let probe = format!("import {name}");
                backend
                    .run_in_environment(prefix, &["python", "-c", &probe], ctx)?
                    .success
            }
        };
        debug!(requirement = %requirement.id(), present, "verification probe");
        if !present {
            missing.insert(requirement.id());
        }
    }

    Ok(VerificationReport { required, missing })
}
