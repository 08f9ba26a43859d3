//! Settings scope guard
//!
//! Every change the render workflow makes to DAW state goes through
//! [`get_set_restore`]: read the current value, apply a transient one, and
//! put the original back when the guard goes away. Restoration runs on
//! success, on an early `?` return, on panic and when a caller drops the
//! work midway.
//!
//! Guards compose through [`ScopeStack`], which restores in strict reverse
//! order of acquisition.

use tracing::{debug, error};

use crate::error::Result;

/// Something that can put a setting back the way it found it.
pub trait Restore {
    /// Restore the original value. Later calls are no-ops.
    fn restore(&mut self) -> Result<()>;
}

/// Holds the original value of one setting until it is restored.
#[must_use = "the setting is restored as soon as the guard is dropped"]
pub struct SettingGuard<'a, T> {
    label: String,
    previous: Option<T>,
    setter: Box<dyn FnMut(T) -> Result<()> + 'a>,
}

/// Read a setting, set `during`, and return a guard that restores the original.
///
/// If applying `during` fails, the original value is written back before the
/// error is returned.
pub fn get_set_restore<'a, T, G, S>(
    label: impl Into<String>,
    getter: G,
    setter: S,
    during: T,
) -> Result<SettingGuard<'a, T>>
where
    G: FnOnce() -> Result<T>,
    S: FnMut(T) -> Result<()> + 'a,
{
    let label = label.into();
    let previous = getter()?;

    let mut guard = SettingGuard {
        label,
        previous: Some(previous),
        setter: Box::new(setter),
    };

    debug!("Setting {}", guard.label);
    (guard.setter)(during)?;
    Ok(guard)
}

impl<T> SettingGuard<'_, T> {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T> Restore for SettingGuard<'_, T> {
    fn restore(&mut self) -> Result<()> {
        match self.previous.take() {
            Some(previous) => {
                debug!("Restoring {}", self.label);
                (self.setter)(previous)
            }
            None => Ok(()),
        }
    }
}

impl<T> Drop for SettingGuard<'_, T> {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            error!("Failed to restore {}: {}", self.label, err);
        }
    }
}

/// An ordered set of guards, restored last-in first-out.
#[derive(Default)]
#[must_use = "settings are restored as soon as the stack is dropped"]
pub struct ScopeStack<'a> {
    guards: Vec<Box<dyn Restore + 'a>>,
}

impl<'a> ScopeStack<'a> {
    pub fn new() -> Self {
        Self { guards: Vec::new() }
    }

    pub fn push(&mut self, guard: impl Restore + 'a) {
        self.guards.push(Box::new(guard));
    }

    /// [`get_set_restore`] and push the guard.
    pub fn enter<T: 'a, G, S>(
        &mut self,
        label: impl Into<String>,
        getter: G,
        setter: S,
        during: T,
    ) -> Result<()>
    where
        G: FnOnce() -> Result<T>,
        S: FnMut(T) -> Result<()> + 'a,
    {
        let guard = get_set_restore(label, getter, setter, during)?;
        self.push(guard);
        Ok(())
    }

    /// Nest another stack inside this one; its guards restore first.
    pub fn append(&mut self, mut inner: ScopeStack<'a>) {
        self.guards.append(&mut inner.guards);
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Restore everything now, reporting the first failure.
    ///
    /// Every guard is restored even if an earlier one fails.
    pub fn release(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(mut guard) = self.guards.pop() {
            if let Err(err) = guard.restore() {
                error!("Failed to restore setting: {}", err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ScopeStack<'_> {
    fn drop(&mut self) {
        while let Some(mut guard) = self.guards.pop() {
            if let Err(err) = guard.restore() {
                error!("Failed to restore setting: {}", err);
            }
        }
    }
}
