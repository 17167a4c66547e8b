//! Event filtering for watched resources.
//!
//! Reconciliation is only worth running when the source controller publishes
//! a new artifact; status updates that keep the same revision are dropped.

use crate::types::{ObjectRef, WatchedResource};

/// A change notification for a watched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(WatchedResource),
    Updated {
        old: Option<WatchedResource>,
        new: WatchedResource,
    },
    Deleted(WatchedResource),
}

impl WatchEvent {
    /// Identity of the resource the event refers to.
    pub fn object_ref(&self) -> ObjectRef {
        match self {
            WatchEvent::Created(resource) | WatchEvent::Deleted(resource) => {
                resource.object_ref()
            }
            WatchEvent::Updated { new, .. } => new.object_ref(),
        }
    }
}

/// Admits events whose artifact revision changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionChangePredicate;

impl RevisionChangePredicate {
    pub fn admit(&self, event: &WatchEvent) -> bool {
        match event {
            WatchEvent::Created(_) | WatchEvent::Deleted(_) => true,
            WatchEvent::Updated { old: None, .. } => true,
            WatchEvent::Updated {
                old: Some(old),
                new,
            } => old.revision() != new.revision(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactStatus;

    fn resource(revision: Option<&str>) -> WatchedResource {
        let artifact = revision.map(|rev| ArtifactStatus {
            url: format!("http://source/{rev}.tar.gz"),
            digest: format!("sha256:{rev}"),
            revision: rev.to_string(),
        });
        WatchedResource::new(&ObjectRef::new("default", "app"), artifact)
    }

    #[test]
    fn create_and_delete_are_always_admitted() {
        let predicate = RevisionChangePredicate;
        assert!(predicate.admit(&WatchEvent::Created(resource(Some("rev1")))));
        assert!(predicate.admit(&WatchEvent::Deleted(resource(Some("rev1")))));
        assert!(predicate.admit(&WatchEvent::Created(resource(None))));
    }

    #[test]
    fn update_without_previous_state_is_admitted() {
        let event = WatchEvent::Updated {
            old: None,
            new: resource(Some("rev1")),
        };
        assert!(RevisionChangePredicate.admit(&event));
    }

    #[test]
    fn update_with_same_revision_is_dropped() {
        let event = WatchEvent::Updated {
            old: Some(resource(Some("rev1"))),
            new: resource(Some("rev1")),
        };
        assert!(!RevisionChangePredicate.admit(&event));

        let event = WatchEvent::Updated {
            old: Some(resource(None)),
            new: resource(None),
        };
        assert!(!RevisionChangePredicate.admit(&event));
    }

    #[test]
    fn update_with_new_revision_is_admitted() {
        let event = WatchEvent::Updated {
            old: Some(resource(Some("rev1"))),
            new: resource(Some("rev2")),
        };
        assert!(RevisionChangePredicate.admit(&event));
    }

    #[test]
    fn artifact_appearing_or_disappearing_is_a_change() {
        let appeared = WatchEvent::Updated {
            old: Some(resource(None)),
            new: resource(Some("rev1")),
        };
        let disappeared = WatchEvent::Updated {
            old: Some(resource(Some("rev1"))),
            new: resource(None),
        };
        assert!(RevisionChangePredicate.admit(&appeared));
        assert!(RevisionChangePredicate.admit(&disappeared));
    }

    #[test]
    fn empty_revision_to_first_revision_is_admitted() {
        let event = WatchEvent::Updated {
            old: Some(resource(Some(""))),
            new: resource(Some("rev1")),
        };
        assert!(RevisionChangePredicate.admit(&event));
    }
}
