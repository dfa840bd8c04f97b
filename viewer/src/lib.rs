//! Presenting documentation on a sandboxed viewer surface.
//!
//! - **`rewrite`**: `href`/`src` relocation and CSP injection
//! - **`surface`**: the host/surface seam, plus a headless recorder
//! - **`bridge`**: `show()`, over the embedded server or a staged bundle
//! - **`bundle`**: reproducible static bundles

pub mod bridge;
pub mod bundle;
pub mod rewrite;
pub mod surface;

pub use bridge::{
    DeploymentMode, ResourceOpened, ShowError, ShowOutcome, ShowSession, ViewerBridge,
    ViewerState,
};
pub use bundle::{BundleError, BundleManifest, default_bundle_dir, stage_bundle};
pub use rewrite::{
    inject_csp, policy_admitting, replace_csp, rewrite, sandbox_uri_mapper, server_uri_mapper,
};
pub use surface::{
    RecordingHost, RecordingSurface, SurfaceError, SurfaceOptions, ViewerHost, ViewerSurface,
};
