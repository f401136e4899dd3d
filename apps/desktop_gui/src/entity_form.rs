//! Entity creation flow: the deferred form open after the menu's close
//! animation, the draft being edited, and the single-submission gate around
//! the remote write.
//!
//! The pending flag is the mutual-exclusion mechanism for the write: while a
//! submission is in flight the submit control stays disabled, so a form can
//! never produce two concurrent create calls. Cancelling while a write is
//! pending is allowed; the form closes and the draft is discarded, and the
//! write's eventual outcome is reported through the status line only.

use std::time::Instant;

use shared::domain::{EntityDraft, EntityKind};

use crate::radial_menu::MODAL_OPEN_DELAY;

pub struct EntityCreationFlow {
    draft: EntityDraft,
    kind: Option<EntityKind>,
    open: bool,
    pending: bool,
    scheduled_open: Option<(EntityKind, Instant)>,
}

impl EntityCreationFlow {
    pub fn new() -> Self {
        Self {
            draft: EntityDraft::default(),
            kind: None,
            open: false,
            pending: false,
            scheduled_open: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    pub fn draft(&self) -> &EntityDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut EntityDraft {
        &mut self.draft
    }

    pub fn has_scheduled_open(&self) -> bool {
        self.scheduled_open.is_some()
    }

    /// Schedules the form to open once the menu's close animation has
    /// finished. Refused while the form is already open or a submission is
    /// still in flight.
    pub fn schedule_open(&mut self, kind: EntityKind, now: Instant) -> bool {
        if self.open || self.pending {
            return false;
        }
        self.scheduled_open = Some((kind, now + MODAL_OPEN_DELAY));
        true
    }

    /// Cancels a not-yet-fired deferred open, e.g. on view teardown.
    pub fn cancel_scheduled_open(&mut self) {
        self.scheduled_open = None;
    }

    /// Fires the one-shot deferred open when its delay has elapsed. Returns
    /// true on the frame the form opens.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.scheduled_open {
            Some((kind, due)) if now >= due => {
                self.scheduled_open = None;
                self.open = true;
                self.kind = Some(kind);
                self.draft = EntityDraft::default();
                true
            }
            _ => false,
        }
    }

    pub fn can_submit(&self) -> bool {
        self.open && !self.pending && self.draft.is_submittable()
    }

    /// Arms the pending flag and hands out what to write. Returns `None`
    /// when submission is not currently permitted, including while an
    /// earlier submission is still in flight.
    pub fn begin_submit(&mut self) -> Option<(EntityKind, EntityDraft)> {
        if !self.can_submit() {
            return None;
        }
        let kind = self.kind?;
        self.pending = true;
        Some((kind, self.draft.clone()))
    }

    pub fn submit_succeeded(&mut self) {
        self.pending = false;
        if self.open {
            self.open = false;
            self.kind = None;
            self.draft = EntityDraft::default();
        }
    }

    /// The draft stays intact and the form stays open so the user can retry
    /// manually. No automatic retry happens at this layer.
    pub fn submit_failed(&mut self) {
        self.pending = false;
    }

    /// Discards the draft and closes the form unconditionally. An in-flight
    /// write is not interrupted; it completes in the background.
    pub fn cancel(&mut self) {
        self.open = false;
        self.kind = None;
        self.draft = EntityDraft::default();
        self.scheduled_open = None;
    }
}

impl Default for EntityCreationFlow {
    fn default() -> Self {
        Self::new()
    }
}
