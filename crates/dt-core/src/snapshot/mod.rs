//! Snapshot builders.
//!
//! [`StaticSnapshot`] is resolved once per session after root detection.
//! [`DynamicSnapshot`] is rebuilt on every poll tick. Both are plain values:
//! once built they are never mutated, and the only state that survives
//! between builds is the caller's [`ProbeState`](crate::probe::ProbeState).

pub mod categories;
pub mod cpu;
pub mod dynamic_info;
pub mod partition;
pub mod static_info;

pub use categories::{Category, CategoryView, Row};
pub use dynamic_info::DynamicSnapshot;
pub use partition::{PartitionLayout, VirtualAb};
pub use static_info::StaticSnapshot;

use std::sync::Arc;

use crate::platform::{DrmProvider, PlatformSource};
use crate::props::PropertyStore;
use crate::shell::ShellExecutor;
use crate::sysfs::NodeReader;

/// Every fact source a builder may consult.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub fs: &'a dyn NodeReader,
    pub shell: &'a dyn ShellExecutor,
    pub props: &'a dyn PropertyStore,
    pub platform: &'a dyn PlatformSource,
    pub drm: &'a dyn DrmProvider,
}

/// Owned counterpart of [`Sources`] for work that outlives the caller's
/// stack, such as the background poller.
#[derive(Clone)]
pub struct SharedSources {
    pub fs: Arc<dyn NodeReader>,
    pub shell: Arc<dyn ShellExecutor>,
    pub props: Arc<dyn PropertyStore>,
    pub platform: Arc<dyn PlatformSource>,
    pub drm: Arc<dyn DrmProvider>,
}

impl SharedSources {
    pub fn borrow(&self) -> Sources<'_> {
        Sources {
            fs: self.fs.as_ref(),
            shell: self.shell.as_ref(),
            props: self.props.as_ref(),
            platform: self.platform.as_ref(),
            drm: self.drm.as_ref(),
        }
    }
}
