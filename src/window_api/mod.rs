//! Contains logic for querying the foreground window from different environments.
//! [GenericWindowManager] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindowData {
    /// Identifier of the process owning the window, when the host exposes one.
    pub process_id: Option<u32>,
    /// Name of the window. For example 'bash in hello' or 'Document 1' or 'Vibing in YouTube -
    /// Chrome'
    pub window_title: Arc<str>,
    /// Short executable name. For example 'Code.exe' or 'firefox'
    pub process_name: Arc<str>,
}

/// Intended to serve as a contract windows and linux systems must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsWindowManager;
                Ok(Self {
                    inner: Box::new(WindowsWindowManager::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                tracing::warn!("No window backend compiled in, every sample will be Unknown");
                Ok(Self {
                    inner: Box::new(UnsupportedWindowManager),
                })
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        self.inner.get_active_window_data()
    }
}

/// Backend for builds without `win` or `x11`. Every query fails, which the sampler records as an
/// unknown window.
pub struct UnsupportedWindowManager;

impl WindowManager for UnsupportedWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData> {
        Err(anyhow!("No window backend was enabled at build time"))
    }
}

/// Resolves a process id to its short executable name.
pub fn resolve_process_name(id: u32) -> Option<String> {
    use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

    let pid = Pid::from_u32(id);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system
        .process(pid)
        .map(|process| process.name().to_string_lossy().into_owned())
}
