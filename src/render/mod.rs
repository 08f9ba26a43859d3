//! Render Module
//!
//! Everything needed to render the versions of a song from one DAW project:
//! - Song versions and where their renders land
//! - Track classification by naming convention
//! - Scoped, always-restored DAW settings
//! - The per-project render orchestrator
//! - Render results with lazily measured statistics

pub mod guard;
pub mod orchestrator;
pub mod result;
pub mod settings;
pub mod tracks;
pub mod version;

pub use guard::{get_set_restore, Restore, ScopeStack, SettingGuard};
pub use orchestrator::{
    plan_renders, render_project, render_version, RenderObserver, RenderOptions, RenderOutcome,
    TrackRoles,
};
pub use result::{Hms, RenderResult, SummaryStats};
pub use settings::{LIMITER_RANGE, VOCAL_LOUDNESS_WORTH};
pub use version::{SongVersion, STEMS_PATTERN};
