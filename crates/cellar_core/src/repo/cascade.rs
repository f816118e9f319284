//! In-memory side of `ON DELETE CASCADE`.
//!
//! Deleting a wine or the user accounts removes child rows in SQLite; the
//! repositories caching those children subscribe here so the matching
//! instances are released and lose their keys at the same moment.

use crate::model::EntityKey;
use std::cell::RefCell;
use std::rc::Weak;

/// Parent rows that were just deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cascade {
    Wine(EntityKey),
    AllWines,
    AllUsers,
}

/// Repository holding instances whose rows hang off a parent row.
pub(crate) trait CascadeTarget {
    fn parent_deleted(&self, cascade: Cascade);
}

/// Subscribers of a parent repository.
#[derive(Default)]
pub(crate) struct Dependents {
    targets: RefCell<Vec<Weak<dyn CascadeTarget>>>,
}

impl Dependents {
    pub(crate) fn attach(&self, target: Weak<dyn CascadeTarget>) {
        self.targets.borrow_mut().push(target);
    }

    pub(crate) fn notify(&self, cascade: Cascade) {
        let live: Vec<_> = self
            .targets
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for target in live {
            target.parent_deleted(cascade);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cascade, CascadeTarget, Dependents};
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<Cascade>>,
    }

    impl CascadeTarget for Recorder {
        fn parent_deleted(&self, cascade: Cascade) {
            self.seen.borrow_mut().push(cascade);
        }
    }

    #[test]
    fn notifies_live_targets_only() {
        let dependents = Dependents::default();
        let kept = Rc::new(Recorder::default());
        let dropped = Rc::new(Recorder::default());
        let kept_target: Weak<dyn CascadeTarget> = Rc::downgrade(&kept) as Weak<_>;
        let dropped_target: Weak<dyn CascadeTarget> = Rc::downgrade(&dropped) as Weak<_>;
        dependents.attach(kept_target);
        dependents.attach(dropped_target);
        drop(dropped);

        dependents.notify(Cascade::Wine(4));
        dependents.notify(Cascade::AllUsers);
        assert_eq!(
            *kept.seen.borrow(),
            vec![Cascade::Wine(4), Cascade::AllUsers]
        );
    }
}
