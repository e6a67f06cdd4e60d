//! Package manifest construction.
//!
//! [`build`] is a pure function of the [`InstallationProfile`]: no I/O, no
//! clock, no environment reads. Two calls with the same profile produce
//! byte-identical manifests, which keeps backend invocations and logs
//! reproducible across reruns.

use tracing::warn;

use crate::error::{CraftenvError, Result};
use crate::profile::{CudaFallback, InstallationProfile};

/// JAX/jaxlib pin known to work with the rest of the toolchain.
pub const JAX_VERSION: &str = "0.4.14";

/// CUDA toolkit versions the configured channels actually carry.
const SUPPORTED_CUDA: &[(u32, u32)] = &[(11, 8), (12, 0), (12, 1), (12, 2), (12, 4)];

/// One conda package match spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    /// Version constraint including its operator (`=0.4.14`, `<2.0.0`),
    /// or `None` for "any version".
    pub constraint: Option<String>,
}

impl PackageSpec {
    pub fn any(name: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: None,
        }
    }

    pub fn pinned(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: Some(format!("={version}")),
        }
    }

    pub fn constrained(name: &str, constraint: &str) -> Self {
        Self {
            name: name.to_string(),
            constraint: Some(constraint.to_string()),
        }
    }

    /// Render as a backend-ready match spec.
    pub fn render(&self) -> String {
        match &self.constraint {
            Some(c) => format!("{}{}", self.name, c),
            None => self.name.clone(),
        }
    }
}

/// Concrete, ordered package and channel list for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub base_packages: Vec<PackageSpec>,
    pub variant_packages: Vec<PackageSpec>,
    pub channels: Vec<String>,
}

impl PackageManifest {
    /// All packages in install order, rendered as match specs.
    ///
    /// The whole list goes to the backend as one transaction so its solver
    /// resolves conflicts across the full set.
    pub fn render_packages(&self) -> Vec<String> {
        self.base_packages
            .iter()
            .chain(self.variant_packages.iter())
            .map(PackageSpec::render)
            .collect()
    }
}

fn base_packages() -> Vec<PackageSpec> {
    vec![
        PackageSpec::pinned("python", "3.10"),
        PackageSpec::any("pip"),
        PackageSpec::any("pandas"),
        PackageSpec::any("matplotlib"),
        PackageSpec::constrained("numpy", "<2.0.0"),
        PackageSpec::any("biopython"),
        PackageSpec::any("scipy"),
        PackageSpec::any("pdbfixer"),
        PackageSpec::any("seaborn"),
        PackageSpec::any("libgfortran5"),
        PackageSpec::any("tqdm"),
        PackageSpec::any("jupyter"),
        PackageSpec::any("ffmpeg"),
        PackageSpec::any("pyrosetta"),
        PackageSpec::any("fsspec"),
        PackageSpec::any("py3dmol"),
        PackageSpec::any("chex"),
        PackageSpec::any("dm-haiku"),
        PackageSpec::pinned("flax", "0.9.0"),
        PackageSpec::any("dm-tree"),
        PackageSpec::any("joblib"),
        PackageSpec::any("ml-collections"),
        PackageSpec::any("immutabledict"),
        PackageSpec::any("optax"),
    ]
}

fn parse_cuda(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.splitn(2, '.');
    let major = parts.next()?.parse().ok()?;
    let minor = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

fn is_supported(requested: (u32, u32)) -> bool {
    SUPPORTED_CUDA.contains(&requested)
}

/// Closest supported version to the request. Ties break toward the earlier
/// table entry so the substitution is deterministic.
fn nearest_supported(requested: (u32, u32)) -> (u32, u32) {
    let score = |(major, minor): (u32, u32)| i64::from(major) * 100 + i64::from(minor);
    let target = score(requested);
    *SUPPORTED_CUDA
        .iter()
        .min_by_key(|candidate| (score(**candidate) - target).abs())
        .expect("support table is non-empty")
}

/// Resolve the cudatoolkit match spec for a requested version.
///
/// Never falls back to the CPU variant: an unsupported request either
/// substitutes, widens to a wildcard, or fails, per the profile policy.
fn cuda_toolkit_spec(requested: &str, policy: CudaFallback) -> Result<PackageSpec> {
    let parsed = parse_cuda(requested).ok_or_else(|| CraftenvError::ManifestError {
        message: format!("unparseable CUDA version '{requested}'"),
    })?;

    if is_supported(parsed) {
        return Ok(PackageSpec::pinned(
            "cudatoolkit",
            &format!("{}.{}", parsed.0, parsed.1),
        ));
    }

    match policy {
        CudaFallback::Nearest => {
            let (major, minor) = nearest_supported(parsed);
            let substituted = format!("{major}.{minor}");
            warn!(
                requested,
                substituted, "requested CUDA version unavailable, substituting nearest supported"
            );
            Ok(PackageSpec::pinned("cudatoolkit", &substituted))
        }
        CudaFallback::Wildcard => Ok(PackageSpec::pinned("cudatoolkit", &format!("{}.*", parsed.0))),
        CudaFallback::Strict => Err(CraftenvError::ManifestError {
            message: format!(
                "CUDA {requested} is not available from the configured channels \
                 (supported: {})",
                SUPPORTED_CUDA
                    .iter()
                    .map(|(ma, mi)| format!("{ma}.{mi}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }),
    }
}

/// Build the manifest for a validated profile.
pub fn build(profile: &InstallationProfile) -> Result<PackageManifest> {
    let mut variant_packages = vec![
        PackageSpec::pinned("jax", JAX_VERSION),
        PackageSpec::pinned("jaxlib", JAX_VERSION),
    ];

    let mut channels = vec!["conda-forge".to_string()];

    if let Some(requested) = &profile.cuda {
        variant_packages.push(cuda_toolkit_spec(requested, profile.cuda_fallback)?);
        variant_packages.push(PackageSpec::any("cuda-nvcc"));
        variant_packages.push(PackageSpec::any("cudnn"));
        channels.push("nvidia".to_string());
    }

    channels.push("https://conda.graylab.jhu.edu".to_string());

    Ok(PackageManifest {
        base_packages: base_packages(),
        variant_packages,
        channels,
    })
}
