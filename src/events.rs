use serde::{Deserialize, Serialize};

// ============================================================================
// Domain Event Catalog
// ============================================================================
//
// The fixed mapping of (collection, transition) → event kind. Nine
// collections, three lifecycle transitions each, 27 event kinds in total.
// Modelled as closed enums so an unmapped pair or a duplicated identifier
// cannot exist — the compiler checks catalog completeness.
//
// ============================================================================

/// The nine entity collections watched by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    Routers,
    Users,
    Devices,
    Producers,
    Stages,
    Groups,
    GroupVolumes,
    GroupUsers,
    GroupUserVolumes,
}

impl Collection {
    pub const ALL: [Collection; 9] = [
        Collection::Routers,
        Collection::Users,
        Collection::Devices,
        Collection::Producers,
        Collection::Stages,
        Collection::Groups,
        Collection::GroupVolumes,
        Collection::GroupUsers,
        Collection::GroupUserVolumes,
    ];

    /// Name of the persisted collection (table) backing this entity kind.
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Routers => "routers",
            Collection::Users => "users",
            Collection::Devices => "devices",
            Collection::Producers => "producers",
            Collection::Stages => "stages",
            Collection::Groups => "groups",
            Collection::GroupVolumes => "group_volumes",
            Collection::GroupUsers => "group_users",
            Collection::GroupUserVolumes => "group_user_volumes",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Classification of a single observed mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Added,
    Changed,
    Removed,
}

impl Transition {
    pub const ALL: [Transition; 3] = [Transition::Added, Transition::Changed, Transition::Removed];

    pub fn as_str(self) -> &'static str {
        match self {
            Transition::Added => "added",
            Transition::Changed => "changed",
            Transition::Removed => "removed",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public event kinds published on the bus, one per (collection, transition)
/// pair. Every kind has its own identifier; no two pairs share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    RouterAdded,
    RouterChanged,
    RouterRemoved,
    UserAdded,
    UserChanged,
    UserRemoved,
    DeviceAdded,
    DeviceChanged,
    DeviceRemoved,
    ProducerAdded,
    ProducerChanged,
    ProducerRemoved,
    StageAdded,
    StageChanged,
    StageRemoved,
    GroupAdded,
    GroupChanged,
    GroupRemoved,
    GroupVolumeAdded,
    GroupVolumeChanged,
    GroupVolumeRemoved,
    GroupUserAdded,
    GroupUserChanged,
    GroupUserRemoved,
    GroupUserVolumeAdded,
    GroupUserVolumeChanged,
    GroupUserVolumeRemoved,
}

impl EventKind {
    pub const ALL: [EventKind; 27] = [
        EventKind::RouterAdded,
        EventKind::RouterChanged,
        EventKind::RouterRemoved,
        EventKind::UserAdded,
        EventKind::UserChanged,
        EventKind::UserRemoved,
        EventKind::DeviceAdded,
        EventKind::DeviceChanged,
        EventKind::DeviceRemoved,
        EventKind::ProducerAdded,
        EventKind::ProducerChanged,
        EventKind::ProducerRemoved,
        EventKind::StageAdded,
        EventKind::StageChanged,
        EventKind::StageRemoved,
        EventKind::GroupAdded,
        EventKind::GroupChanged,
        EventKind::GroupRemoved,
        EventKind::GroupVolumeAdded,
        EventKind::GroupVolumeChanged,
        EventKind::GroupVolumeRemoved,
        EventKind::GroupUserAdded,
        EventKind::GroupUserChanged,
        EventKind::GroupUserRemoved,
        EventKind::GroupUserVolumeAdded,
        EventKind::GroupUserVolumeChanged,
        EventKind::GroupUserVolumeRemoved,
    ];

    /// Catalog lookup: the event kind published for one transition observed
    /// on one collection. Total over all 27 pairs.
    pub fn for_transition(collection: Collection, transition: Transition) -> EventKind {
        use Transition::{Added, Changed, Removed};

        match (collection, transition) {
            (Collection::Routers, Added) => EventKind::RouterAdded,
            (Collection::Routers, Changed) => EventKind::RouterChanged,
            (Collection::Routers, Removed) => EventKind::RouterRemoved,
            (Collection::Users, Added) => EventKind::UserAdded,
            (Collection::Users, Changed) => EventKind::UserChanged,
            (Collection::Users, Removed) => EventKind::UserRemoved,
            (Collection::Devices, Added) => EventKind::DeviceAdded,
            (Collection::Devices, Changed) => EventKind::DeviceChanged,
            (Collection::Devices, Removed) => EventKind::DeviceRemoved,
            (Collection::Producers, Added) => EventKind::ProducerAdded,
            (Collection::Producers, Changed) => EventKind::ProducerChanged,
            (Collection::Producers, Removed) => EventKind::ProducerRemoved,
            (Collection::Stages, Added) => EventKind::StageAdded,
            (Collection::Stages, Changed) => EventKind::StageChanged,
            (Collection::Stages, Removed) => EventKind::StageRemoved,
            (Collection::Groups, Added) => EventKind::GroupAdded,
            (Collection::Groups, Changed) => EventKind::GroupChanged,
            (Collection::Groups, Removed) => EventKind::GroupRemoved,
            (Collection::GroupVolumes, Added) => EventKind::GroupVolumeAdded,
            (Collection::GroupVolumes, Changed) => EventKind::GroupVolumeChanged,
            (Collection::GroupVolumes, Removed) => EventKind::GroupVolumeRemoved,
            (Collection::GroupUsers, Added) => EventKind::GroupUserAdded,
            (Collection::GroupUsers, Changed) => EventKind::GroupUserChanged,
            (Collection::GroupUsers, Removed) => EventKind::GroupUserRemoved,
            (Collection::GroupUserVolumes, Added) => EventKind::GroupUserVolumeAdded,
            (Collection::GroupUserVolumes, Changed) => EventKind::GroupUserVolumeChanged,
            (Collection::GroupUserVolumes, Removed) => EventKind::GroupUserVolumeRemoved,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RouterAdded => "RouterAdded",
            EventKind::RouterChanged => "RouterChanged",
            EventKind::RouterRemoved => "RouterRemoved",
            EventKind::UserAdded => "UserAdded",
            EventKind::UserChanged => "UserChanged",
            EventKind::UserRemoved => "UserRemoved",
            EventKind::DeviceAdded => "DeviceAdded",
            EventKind::DeviceChanged => "DeviceChanged",
            EventKind::DeviceRemoved => "DeviceRemoved",
            EventKind::ProducerAdded => "ProducerAdded",
            EventKind::ProducerChanged => "ProducerChanged",
            EventKind::ProducerRemoved => "ProducerRemoved",
            EventKind::StageAdded => "StageAdded",
            EventKind::StageChanged => "StageChanged",
            EventKind::StageRemoved => "StageRemoved",
            EventKind::GroupAdded => "GroupAdded",
            EventKind::GroupChanged => "GroupChanged",
            EventKind::GroupRemoved => "GroupRemoved",
            EventKind::GroupVolumeAdded => "GroupVolumeAdded",
            EventKind::GroupVolumeChanged => "GroupVolumeChanged",
            EventKind::GroupVolumeRemoved => "GroupVolumeRemoved",
            EventKind::GroupUserAdded => "GroupUserAdded",
            EventKind::GroupUserChanged => "GroupUserChanged",
            EventKind::GroupUserRemoved => "GroupUserRemoved",
            EventKind::GroupUserVolumeAdded => "GroupUserVolumeAdded",
            EventKind::GroupUserVolumeChanged => "GroupUserVolumeChanged",
            EventKind::GroupUserVolumeRemoved => "GroupUserVolumeRemoved",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_covers_every_pair_with_a_unique_kind() {
        let mut kinds = HashSet::new();

        for collection in Collection::ALL {
            for transition in Transition::ALL {
                kinds.insert(EventKind::for_transition(collection, transition));
            }
        }

        // 9 collections × 3 transitions, no two pairs collapsed
        assert_eq!(kinds.len(), 27);
    }

    #[test]
    fn event_kind_names_are_unique() {
        let names: HashSet<&str> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn table_names_are_unique() {
        let names: HashSet<&str> = Collection::ALL.iter().map(|c| c.table_name()).collect();
        assert_eq!(names.len(), Collection::ALL.len());
    }

    #[test]
    fn catalog_spot_checks() {
        assert_eq!(
            EventKind::for_transition(Collection::Stages, Transition::Added),
            EventKind::StageAdded
        );
        assert_eq!(
            EventKind::for_transition(Collection::GroupUserVolumes, Transition::Removed),
            EventKind::GroupUserVolumeRemoved
        );
        assert_eq!(EventKind::GroupVolumeChanged.as_str(), "GroupVolumeChanged");
    }
}
