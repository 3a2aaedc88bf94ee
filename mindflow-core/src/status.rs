//! Process-wide status gate.
//!
//! One [`SystemStatus`] value, guarded by one lock, arbitrates between the
//! live chat and the administrative edit modes (memory, role graph, query
//! bank, answer bank, configuration). At most one of `active` or an
//! `*_editing` state holds at any instant.
//!
//! The lock is held only for the check-and-set. Callers must never hold an
//! admission across a suspend point expecting the status to be unchanged;
//! they re-validate their own state afterwards.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MindflowError, Result};

// ---------------------------------------------------------------------------
// Status & roles
// ---------------------------------------------------------------------------

/// The single shared status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// Process started, chatbot not yet built.
    Uninitialized,
    /// The one-time chatbot initialisation failed.
    InitFailed,
    /// Idle; any mode may be entered.
    Closed,
    /// A chat is live.
    Active,
    /// Configuration is being rewritten.
    ConfigEditing,
    /// The role graph is being edited.
    RoleGraphEditing,
    /// The standard query bank is being edited.
    StandardQueryEditing,
    /// The standard answer bank is being edited.
    StandardAnswerEditing,
    /// The memory store is being edited.
    MemoryEditing,
}

impl SystemStatus {
    /// Snake-case name, as reported to callers in busy signals.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::InitFailed => "init_failed",
            Self::Closed => "closed",
            Self::Active => "active",
            Self::ConfigEditing => "config_editing",
            Self::RoleGraphEditing => "role_graph_editing",
            Self::StandardQueryEditing => "standard_query_editing",
            Self::StandardAnswerEditing => "standard_answer_editing",
            Self::MemoryEditing => "memory_editing",
        }
    }

    /// Whether this is one of the `*_editing` states.
    #[must_use]
    pub fn is_editing(self) -> bool {
        matches!(
            self,
            Self::ConfigEditing
                | Self::RoleGraphEditing
                | Self::StandardQueryEditing
                | Self::StandardAnswerEditing
                | Self::MemoryEditing
        )
    }

    /// Whether the one-time initialisation has not succeeded.
    #[must_use]
    pub fn is_uninitialized(self) -> bool {
        matches!(self, Self::Uninitialized | Self::InitFailed)
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subsystem that takes write access through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateRole {
    /// Live chat and session lifecycle.
    Chat,
    /// Memory store editor.
    MemoryEdit,
    /// Role graph editor.
    RoleGraphEdit,
    /// Standard query bank editor.
    QueryEdit,
    /// Standard answer bank editor.
    AnswerEdit,
    /// Configuration editor.
    ConfigEdit,
}

impl GateRole {
    /// The status this role holds while it has write access.
    #[must_use]
    pub fn held_status(self) -> SystemStatus {
        match self {
            Self::Chat => SystemStatus::Active,
            Self::MemoryEdit => SystemStatus::MemoryEditing,
            Self::RoleGraphEdit => SystemStatus::RoleGraphEditing,
            Self::QueryEdit => SystemStatus::StandardQueryEditing,
            Self::AnswerEdit => SystemStatus::StandardAnswerEditing,
            Self::ConfigEdit => SystemStatus::ConfigEditing,
        }
    }

    /// Whether `status` blocks this role from taking write access.
    #[must_use]
    pub fn conflicts_with(self, status: SystemStatus) -> bool {
        if status == self.held_status() || status == SystemStatus::Closed {
            return false;
        }
        match self {
            // Uninitialised chat is reported as unavailable, not busy.
            Self::Chat => !status.is_uninitialized(),
            // The memory store only exists once the chatbot is built.
            Self::MemoryEdit => true,
            Self::RoleGraphEdit | Self::QueryEdit | Self::AnswerEdit | Self::ConfigEdit => {
                status == SystemStatus::Active || status.is_editing()
            }
        }
    }

    /// Whether reads of this role's domain are permitted under `status`.
    #[must_use]
    pub fn read_allowed(self, status: SystemStatus) -> bool {
        match self {
            Self::MemoryEdit => {
                matches!(status, SystemStatus::Closed | SystemStatus::MemoryEditing)
            }
            Self::RoleGraphEdit | Self::QueryEdit | Self::AnswerEdit => !matches!(
                status,
                SystemStatus::ConfigEditing | SystemStatus::Active
            ),
            Self::Chat | Self::ConfigEdit => true,
        }
    }
}

/// Outcome of a successful [`StatusGate::try_enter_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The role took write access; status now equals its held status.
    Entered,
    /// The role already held write access; nothing changed.
    AlreadyHeld,
    /// Chat moved `closed → active`; the caller must initialise the shared
    /// chatbot if needed and reset its UI-facing history.
    Activated,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Thread-safe status arbiter. Cloning shares the same underlying state.
pub struct StatusGate {
    inner: Arc<Mutex<GateInner>>,
}

struct GateInner {
    status: SystemStatus,
    /// Status to restore on exit when an edit began before initialisation.
    resume_to: SystemStatus,
}

impl StatusGate {
    /// A gate in the `uninitialized` state.
    #[must_use]
    pub fn new() -> Self {
        Self::with_status(SystemStatus::Uninitialized)
    }

    /// A gate starting in `status`.
    #[must_use]
    pub fn with_status(status: SystemStatus) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GateInner {
                status,
                resume_to: SystemStatus::Closed,
            })),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SystemStatus {
        self.inner.lock().status
    }

    /// Record the outcome of the one-time chatbot initialisation.
    ///
    /// Only moves out of `uninitialized`; a later call is ignored. When an
    /// editor entered before initialisation, the outcome becomes the status
    /// it restores on exit.
    pub fn mark_initialized(&self, ok: bool) {
        let mut inner = self.inner.lock();
        let settled = if ok {
            SystemStatus::Closed
        } else {
            SystemStatus::InitFailed
        };
        if inner.status == SystemStatus::Uninitialized {
            inner.status = settled;
            info!(status = %settled, "chatbot initialisation settled");
        } else if inner.status.is_editing() && inner.resume_to == SystemStatus::Uninitialized {
            inner.resume_to = settled;
            info!(status = %inner.status, resume_to = %settled, "chatbot initialisation settled during edit");
        } else {
            debug!(status = %inner.status, "mark_initialized ignored");
        }
    }

    /// Force `init_failed` after a failed lazy initialisation on chat entry.
    pub fn set_init_failed(&self) {
        let mut inner = self.inner.lock();
        warn!(from = %inner.status, "status -> init_failed");
        inner.status = SystemStatus::InitFailed;
    }

    /// Atomically check for conflicts and take write access for `role`.
    ///
    /// # Errors
    ///
    /// * [`MindflowError::Busy`] carrying the blocking status.
    /// * [`MindflowError::Unavailable`] when `role` is chat and the chatbot
    ///   was never successfully initialised.
    pub fn try_enter_write(&self, role: GateRole) -> Result<Admission> {
        let mut inner = self.inner.lock();
        let current = inner.status;

        if current == role.held_status() {
            return Ok(Admission::AlreadyHeld);
        }
        if role == GateRole::Chat && current.is_uninitialized() {
            return Err(MindflowError::Unavailable(format!(
                "chatbot is {current}"
            )));
        }
        if role.conflicts_with(current) {
            debug!(?role, status = %current, "admission refused");
            return Err(MindflowError::Busy { status: current });
        }

        inner.resume_to = if current.is_uninitialized() {
            current
        } else {
            SystemStatus::Closed
        };
        inner.status = role.held_status();
        info!(?role, from = %current, to = %inner.status, "status transition");

        if role == GateRole::Chat {
            Ok(Admission::Activated)
        } else {
            Ok(Admission::Entered)
        }
    }

    /// Release write access for `role`.
    ///
    /// Restores `closed` only if the status is still exactly the role's held
    /// status; returns whether a transition happened.
    pub fn exit_write(&self, role: GateRole) -> bool {
        let mut inner = self.inner.lock();
        if inner.status != role.held_status() {
            debug!(?role, status = %inner.status, "exit_write left status untouched");
            return false;
        }
        let next = inner.resume_to;
        inner.status = next;
        inner.resume_to = SystemStatus::Closed;
        info!(?role, to = %next, "status transition");
        true
    }

    /// Check that `role`'s domain may be read right now.
    ///
    /// # Errors
    ///
    /// Returns [`MindflowError::Busy`] carrying the current status.
    pub fn check_read_allowed(&self, role: GateRole) -> Result<()> {
        let status = self.status();
        if role.read_allowed(status) {
            Ok(())
        } else {
            Err(MindflowError::Busy { status })
        }
    }

    /// Enter `role` and return a guard that exits on drop.
    ///
    /// # Errors
    ///
    /// Same as [`Self::try_enter_write`].
    pub fn edit_scope(&self, role: GateRole) -> Result<EditScope> {
        let admission = self.try_enter_write(role)?;
        Ok(EditScope {
            gate: self.clone(),
            role,
            release: admission != Admission::AlreadyHeld,
        })
    }
}

impl Default for StatusGate {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StatusGate {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for StatusGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusGate")
            .field("status", &self.status())
            .finish()
    }
}

/// RAII write access; calls [`StatusGate::exit_write`] on drop.
///
/// A scope opened while the role already held access leaves it held.
#[must_use = "dropping the scope releases write access immediately"]
pub struct EditScope {
    gate: StatusGate,
    role: GateRole,
    release: bool,
}

impl EditScope {
    /// The role this scope holds.
    #[must_use]
    pub fn role(&self) -> GateRole {
        self.role
    }
}

impl Drop for EditScope {
    fn drop(&mut self) {
        if self.release {
            self.gate.exit_write(self.role);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
