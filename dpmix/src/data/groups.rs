use crate::error::GroupError;

/// Index of an entity within the fixed population.
pub type EntityId = usize;
/// Index of a live group. Unique while the group is alive, recycled after deletion.
pub type GroupId = usize;

#[derive(Clone, Debug)]
struct Slot<T> {
    count: usize,
    data: T,
}

/// Bookkeeping for a fixed population of entities spread over a dynamic set
/// of groups, each carrying a payload `T`.
///
/// Groups live in an arena indexed by [`GroupId`]; deleted slots go on a
/// free list and are handed out again by [`GroupManager::create_group`].
/// Iteration always runs in ascending group id.
#[derive(Clone, Debug)]
pub struct GroupManager<T> {
    assignments: Vec<Option<GroupId>>,
    slots: Vec<Option<Slot<T>>>,
    free: Vec<GroupId>,
    n_groups: usize,
    n_assigned: usize,
}

impl<T> GroupManager<T> {
    /// Create a manager for `n` entities with no groups.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            assignments: vec![None; n],
            slots: Vec::new(),
            free: Vec::new(),
            n_groups: 0,
            n_assigned: 0,
        }
    }

    /// Create an empty group holding `data` and return its id.
    pub fn create_group(&mut self, data: T) -> GroupId {
        let slot = Some(Slot { count: 0, data });
        self.n_groups += 1;
        match self.free.pop() {
            Some(gid) => {
                self.slots[gid] = slot;
                gid
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        }
    }

    /// Delete an empty group, returning its payload.
    pub fn delete_group(&mut self, gid: GroupId) -> Result<T, GroupError> {
        let count = self.slot(gid)?.count;
        if count != 0 {
            return Err(GroupError::GroupNotEmpty { gid, count });
        }

        let slot = self.slots[gid]
            .take()
            .ok_or(GroupError::UnknownGroup { gid })?;
        self.free.push(gid);
        self.n_groups -= 1;
        Ok(slot.data)
    }

    /// Assign entity `eid` to group `gid`, returning the group's payload for update.
    pub fn add_entity_to_group(
        &mut self,
        gid: GroupId,
        eid: EntityId,
    ) -> Result<&mut T, GroupError> {
        let n = self.assignments.len();
        match self.assignments.get(eid) {
            None => return Err(GroupError::UnknownEntity { eid, n }),
            Some(Some(current)) => {
                return Err(GroupError::AlreadyAssigned { eid, gid: *current });
            }
            Some(None) => {}
        }

        let slot = self.slot_mut(gid)?;
        slot.count += 1;
        self.assignments[eid] = Some(gid);
        self.n_assigned += 1;
        // Re-borrow after the bookkeeping above.
        Ok(&mut self.slot_mut(gid)?.data)
    }

    /// Unassign entity `eid`, returning the group it left and that group's payload.
    pub fn remove_entity_from_group(
        &mut self,
        eid: EntityId,
    ) -> Result<(GroupId, &mut T), GroupError> {
        let n = self.assignments.len();
        let gid = self
            .assignments
            .get_mut(eid)
            .ok_or(GroupError::UnknownEntity { eid, n })?
            .take()
            .ok_or(GroupError::NotAssigned { eid })?;

        self.n_assigned -= 1;
        let slot = self.slot_mut(gid)?;
        slot.count -= 1;
        Ok((gid, &mut slot.data))
    }

    /// Ids of every live group holding no entities, ascending.
    #[must_use]
    pub fn empty_groups(&self) -> Vec<GroupId> {
        self.groupiter()
            .filter_map(|(gid, count, _)| (count == 0).then_some(gid))
            .collect()
    }

    /// Ids of every live group, ascending.
    #[must_use]
    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groupiter().map(|(gid, _, _)| gid).collect()
    }

    #[must_use]
    pub const fn ngroups(&self) -> usize {
        self.n_groups
    }

    /// The population size `N`.
    #[must_use]
    pub fn nentities(&self) -> usize {
        self.assignments.len()
    }

    /// Number of entities currently assigned to some group.
    #[must_use]
    pub const fn nassigned(&self) -> usize {
        self.n_assigned
    }

    pub fn nentities_in_group(&self, gid: GroupId) -> Result<usize, GroupError> {
        self.slot(gid).map(|slot| slot.count)
    }

    #[must_use]
    pub fn contains_group(&self, gid: GroupId) -> bool {
        self.slot(gid).is_ok()
    }

    /// Live groups as `(gid, count, payload)`, ascending by id.
    pub fn groupiter(&self) -> impl Iterator<Item = (GroupId, usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(gid, slot)| {
            slot.as_ref().map(|slot| (gid, slot.count, &slot.data))
        })
    }

    /// Mutable variant of [`GroupManager::groupiter`].
    pub fn groupiter_mut(&mut self) -> impl Iterator<Item = (GroupId, usize, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(gid, slot)| {
            slot.as_mut().map(|slot| (gid, slot.count, &mut slot.data))
        })
    }

    pub fn group_data(&self, gid: GroupId) -> Result<&T, GroupError> {
        self.slot(gid).map(|slot| &slot.data)
    }

    pub fn group_data_mut(&mut self, gid: GroupId) -> Result<&mut T, GroupError> {
        self.slot_mut(gid).map(|slot| &mut slot.data)
    }

    /// The group of every entity, `None` for unassigned entities.
    #[must_use]
    pub fn assignments(&self) -> &[Option<GroupId>] {
        &self.assignments
    }

    #[must_use]
    pub fn assignment(&self, eid: EntityId) -> Option<GroupId> {
        self.assignments.get(eid).copied().flatten()
    }

    #[must_use]
    pub fn all_entities_assigned(&self) -> bool {
        self.n_assigned == self.assignments.len()
    }

    #[must_use]
    pub const fn no_entities_assigned(&self) -> bool {
        self.n_assigned == 0
    }

    fn slot(&self, gid: GroupId) -> Result<&Slot<T>, GroupError> {
        self.slots
            .get(gid)
            .and_then(Option::as_ref)
            .ok_or(GroupError::UnknownGroup { gid })
    }

    fn slot_mut(&mut self, gid: GroupId) -> Result<&mut Slot<T>, GroupError> {
        self.slots
            .get_mut(gid)
            .and_then(Option::as_mut)
            .ok_or(GroupError::UnknownGroup { gid })
    }
}
