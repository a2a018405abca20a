//! Window Handle Registry: enumeration and liveness checks.

use crate::{PlatformError, WindowEntry, WindowHandle, WindowSystem};
use std::sync::Arc;

/// Read-only view of the selectable top-level windows.
pub struct WindowRegistry<W: WindowSystem> {
    system: Arc<W>,
}

impl<W: WindowSystem> Clone for WindowRegistry<W> {
    fn clone(&self) -> Self {
        Self {
            system: Arc::clone(&self.system),
        }
    }
}

impl<W: WindowSystem> WindowRegistry<W> {
    pub fn new(system: Arc<W>) -> Self {
        Self { system }
    }

    /// Visible, titled top-level windows sorted by title (case-insensitive),
    /// then by handle for a stable order among equal titles.
    pub fn enumerate(&self) -> Result<Vec<WindowEntry>, PlatformError> {
        let mut entries: Vec<WindowEntry> = self
            .system
            .enumerate_windows()?
            .into_iter()
            .filter(|entry| !entry.title.trim().is_empty())
            .collect();

        entries.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then(a.handle.cmp(&b.handle))
        });

        tracing::debug!("Enumerated {} selectable windows", entries.len());
        Ok(entries)
    }

    pub fn is_alive(&self, handle: WindowHandle) -> bool {
        self.system.is_window(handle)
    }

    /// Current title for a handle, looked up through a fresh enumeration.
    pub fn title_of(&self, handle: WindowHandle) -> Option<String> {
        self.system
            .enumerate_windows()
            .ok()?
            .into_iter()
            .find(|entry| entry.handle == handle)
            .map(|entry| entry.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeWindowSystem;
    use crate::Rect;

    fn handle(raw: u64) -> WindowHandle {
        WindowHandle::from_raw(raw)
    }

    #[test]
    fn test_enumerate_sorted_by_title() {
        let system = Arc::new(FakeWindowSystem::new());
        system.add_window(handle(100), "notepad", Rect::new(0, 0, 100, 100));
        system.add_window(handle(200), "Calculator", Rect::new(0, 0, 100, 100));
        system.add_window(handle(300), "Browser", Rect::new(0, 0, 100, 100));

        let registry = WindowRegistry::new(system);
        let titles: Vec<String> = registry
            .enumerate()
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["Browser", "Calculator", "notepad"]);
    }

    #[test]
    fn test_enumerate_skips_hidden_and_untitled() {
        let system = Arc::new(FakeWindowSystem::new());
        system.add_window(handle(100), "Notepad", Rect::new(0, 0, 100, 100));
        system.add_window(handle(200), "", Rect::new(0, 0, 100, 100));
        system.add_window(handle(300), "Hidden", Rect::new(0, 0, 100, 100));
        system.set_visible(handle(300), false);

        let registry = WindowRegistry::new(system);
        let entries = registry.enumerate().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].handle, handle(100));
    }

    #[test]
    fn test_enumerate_empty_desktop() {
        let registry = WindowRegistry::new(Arc::new(FakeWindowSystem::new()));
        assert!(registry.enumerate().unwrap().is_empty());
    }

    #[test]
    fn test_is_alive_and_title_of() {
        let system = Arc::new(FakeWindowSystem::new());
        system.add_window(handle(100), "Notepad", Rect::new(0, 0, 100, 100));
        let registry = WindowRegistry::new(Arc::clone(&system));

        assert!(registry.is_alive(handle(100)));
        assert_eq!(registry.title_of(handle(100)).as_deref(), Some("Notepad"));

        system.close_window(handle(100));
        assert!(!registry.is_alive(handle(100)));
        assert_eq!(registry.title_of(handle(100)), None);
    }
}
