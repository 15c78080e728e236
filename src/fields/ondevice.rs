// src/fields/ondevice.rs
//
// "On device" is never persisted to the store - it reflects whatever the
// owning application's last device sync told it, so the field is just a
// runtime set the application pushes into, read back as a tristate bool
// sort key the same way every other field is.

use crate::fields::SortKey;
use crate::link_table::Id;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct OnDeviceField {
    present: HashSet<Id>,
}

impl OnDeviceField {
    pub fn new() -> Self {
        OnDeviceField { present: HashSet::new() }
    }

    pub fn set_on_device(&mut self, book_ids: impl IntoIterator<Item = Id>, on_device: bool) {
        for id in book_ids {
            if on_device {
                self.present.insert(id);
            } else {
                self.present.remove(&id);
            }
        }
    }

    pub fn for_book(&self, book_id: Id) -> bool {
        self.present.contains(&book_id)
    }

    pub fn sort_key(&self, book_id: Id, tristate: bool) -> SortKey {
        SortKey::from_bool(Some(self.for_book(book_id)), tristate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_membership_updates_status() {
        let mut field = OnDeviceField::new();
        field.set_on_device([7, 8], true);
        assert!(field.for_book(7));
        field.set_on_device([7], false);
        assert!(!field.for_book(7));
        assert!(field.for_book(8));
    }
}
