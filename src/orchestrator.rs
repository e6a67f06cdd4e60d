//! Run orchestration.
//!
//! A linear state machine with fail-fast abort: every stage's side
//! effects are fully committed before the next stage starts, no stage is
//! re-entered, and the first failure terminates the run. Elapsed
//! wall-clock time is measured from `Init` and reported whether the run
//! finishes at `Done` or aborts at `Failed`.

use std::time::{Duration, Instant};

use tracing::info;

use crate::assets::{self, AssetBundle};
use crate::backend::{resolver, Backend};
use crate::environment::{self, default_pip_extras};
use crate::error::CraftenvError;
use crate::finalize;
use crate::manifest;
use crate::profile::{ExecutionContext, InstallationProfile};
use crate::ui;
use crate::verify::{self, default_requirements};

/// Stages of one provisioning run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    BackendResolved,
    ManifestBuilt,
    EnvironmentCreated,
    PipExtrasInstalled,
    AssetsProvisioned,
    Verified,
    PermissionsSet,
    CacheCleaned,
    Done,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::BackendResolved => "backend-resolve",
            Stage::ManifestBuilt => "manifest-build",
            Stage::EnvironmentCreated => "environment-create",
            Stage::PipExtrasInstalled => "pip-extras",
            Stage::AssetsProvisioned => "parameter-bundle",
            Stage::Verified => "verify",
            Stage::PermissionsSet => "permissions",
            Stage::CacheCleaned => "cache-clean",
            Stage::Done => "done",
        }
    }
}

/// Terminal state of a run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Last stage reached (`Done` on success, the failing stage otherwise).
    pub stage: Stage,
    /// Wall-clock time from `Init`.
    pub elapsed: Duration,
    /// The failure, if any.
    pub error: Option<CraftenvError>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub fn exit_code(&self) -> u8 {
        u8::from(!self.success())
    }
}

/// Owns the profile and ambient context for one run.
pub struct Orchestrator {
    profile: InstallationProfile,
    ctx: ExecutionContext,
}

type StageResult<T> = std::result::Result<T, (Stage, CraftenvError)>;

fn at<T>(stage: Stage, result: crate::error::Result<T>) -> StageResult<T> {
    result.map_err(|e| (stage, e))
}

impl Orchestrator {
    /// Build a run from a validated profile.
    pub fn new(profile: InstallationProfile) -> crate::error::Result<Self> {
        let mut ctx = ExecutionContext::new()?;
        if let Some(version) = &profile.cuda_override {
            // Conda-family solvers gate GPU builds on the detected driver;
            // the override makes the virtual package say what we intend to
            // run against, not what the build host happens to have.
            ctx.env
                .insert("CONDA_OVERRIDE_CUDA".to_string(), version.clone());
        }
        Ok(Self { profile, ctx })
    }

    /// Execute the full stage sequence.
    pub fn run(mut self) -> RunOutcome {
        let start = Instant::now();
        info!(prefix = %self.profile.prefix.display(), "provisioning run starting");

        let backend = match at(
            Stage::BackendResolved,
            resolver::resolve(&self.profile, &mut self.ctx),
        ) {
            Ok(backend) => backend,
            Err((stage, error)) => {
                return RunOutcome {
                    stage,
                    elapsed: start.elapsed(),
                    error: Some(error),
                }
            }
        };

        match self.run_with_backend(backend.as_ref()) {
            Ok(()) => RunOutcome {
                stage: Stage::Done,
                elapsed: start.elapsed(),
                error: None,
            },
            Err((stage, error)) => RunOutcome {
                stage,
                elapsed: start.elapsed(),
                error: Some(error),
            },
        }
    }

    /// Stages after backend resolution. Separated so tests can drive the
    /// sequence with a stub backend.
    fn run_with_backend(&mut self, backend: &dyn Backend) -> StageResult<()> {
        ui::stage(&format!("Using {} at {}", backend.name(), backend.binary().display()));

        let manifest = at(Stage::ManifestBuilt, manifest::build(&self.profile))?;

        ui::stage(&format!(
            "Creating environment at {}",
            self.profile.prefix.display()
        ));
        let env = at(
            Stage::EnvironmentCreated,
            environment::materialize(backend, &manifest, &self.profile.prefix, &self.ctx),
        )?;

        ui::stage("Installing pip extras");
        at(
            Stage::PipExtrasInstalled,
            environment::install_pip_extras(backend, &env, &default_pip_extras(), &self.ctx),
        )?;

        if self.profile.skip_weights {
            info!("parameter bundle stage skipped by request");
        } else {
            ui::stage("Provisioning parameter bundle");
            let bundle = AssetBundle::weights(&self.profile, &self.ctx);
            at(Stage::AssetsProvisioned, assets::provision(&bundle))?;
        }

        ui::stage("Verifying environment");
        let report = at(
            Stage::Verified,
            verify::verify(backend, &env.prefix, &default_requirements(), &self.ctx),
        )?;
        if !report.is_satisfied() {
            return Err((
                Stage::Verified,
                CraftenvError::VerificationFailed {
                    missing: report.missing_list(),
                },
            ));
        }

        let working_dir = at(Stage::PermissionsSet, std::env::current_dir().map_err(Into::into))?;
        at(
            Stage::PermissionsSet,
            finalize::fix_permissions(&working_dir, &self.profile.executables),
        )?;

        finalize::clean_cache(backend, &self.ctx);

        Ok(())
    }
}
