//! Canonical forms used for change detection
//!
//! Fetch results and signal-driven edits are both reduced to a canonical
//! form (deduplicated by action hash, sorted by timestamp) before being
//! compared with the cached value. Sorts are stable, so entries with the
//! same timestamp keep the order they arrived in.

use std::collections::HashMap;

use super::hash::HoloHash;
use super::types::{ActionContent, DeletedLink, Link, SignedActionHashed};

/// Deduplicate links by create-link hash, the last occurrence winning, and
/// keep the position of the first occurrence
pub fn uniquify_links(links: Vec<Link>) -> Vec<Link> {
    uniquify_by(links, |link| &link.create_link_hash)
}

/// Deduplicate actions by hash, the last occurrence winning, and keep the
/// position of the first occurrence
pub fn uniquify_actions<A>(actions: Vec<SignedActionHashed<A>>) -> Vec<SignedActionHashed<A>> {
    uniquify_by(actions, |action| action.hash())
}

fn uniquify_by<T>(items: Vec<T>, key: impl Fn(&T) -> &HoloHash) -> Vec<T> {
    let mut slots: Vec<Option<T>> = Vec::with_capacity(items.len());
    let mut positions: HashMap<HoloHash, usize> = HashMap::new();

    for item in items {
        match positions.get(key(&item)) {
            Some(&position) => slots[position] = Some(item),
            None => {
                positions.insert(key(&item).clone(), slots.len());
                slots.push(Some(item));
            }
        }
    }
    slots.into_iter().flatten().collect()
}

pub fn sort_links_by_timestamp(links: &mut [Link]) {
    links.sort_by_key(|link| link.timestamp);
}

pub fn sort_actions_by_timestamp<A: ActionContent>(actions: &mut [SignedActionHashed<A>]) {
    actions.sort_by_key(|action| action.timestamp());
}

/// Order deleted-link groups by create-link timestamp, and each group's
/// deletes by their own timestamps
pub fn sort_deleted_links(groups: &mut [DeletedLink]) {
    groups.sort_by_key(|group| group.create_link.timestamp());
    for group in groups.iter_mut() {
        sort_actions_by_timestamp(&mut group.deletes);
    }
}

/// Deduplicated links in ascending timestamp order
pub fn canonical_links(links: Vec<Link>) -> Vec<Link> {
    let mut links = uniquify_links(links);
    sort_links_by_timestamp(&mut links);
    links
}

/// Deduplicated actions in ascending timestamp order
pub fn canonical_actions<A: ActionContent>(
    actions: Vec<SignedActionHashed<A>>,
) -> Vec<SignedActionHashed<A>> {
    let mut actions = uniquify_actions(actions);
    sort_actions_by_timestamp(&mut actions);
    actions
}

/// Merge groups sharing a create-link hash, deduplicate each group's
/// deletes and sort everything by timestamp
pub fn canonical_deleted_links(groups: Vec<DeletedLink>) -> Vec<DeletedLink> {
    let mut merged: Vec<DeletedLink> = Vec::with_capacity(groups.len());
    for group in groups {
        match merged
            .iter()
            .position(|existing| existing.create_link_hash() == group.create_link_hash())
        {
            Some(index) => merged[index].deletes.extend(group.deletes),
            None => merged.push(group),
        }
    }
    for group in merged.iter_mut() {
        group.deletes = uniquify_actions(std::mem::take(&mut group.deletes));
    }
    sort_deleted_links(&mut merged);
    merged
}

/// Element-wise hash equality
pub fn are_hashes_equal<'a>(
    a: impl IntoIterator<Item = &'a HoloHash>,
    b: impl IntoIterator<Item = &'a HoloHash>,
) -> bool {
    a.into_iter().eq(b)
}

/// Whether two deleted-link lists have the same groups with the same deletes
pub fn are_deleted_links_equal(a: &[DeletedLink], b: &[DeletedLink]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            x.create_link_hash() == y.create_link_hash()
                && are_hashes_equal(
                    x.deletes.iter().map(SignedActionHashed::hash),
                    y.deletes.iter().map(SignedActionHashed::hash),
                )
        })
}

/// Whether `hashes` contains `hash`
pub(crate) fn contains_hash<'a>(
    mut hashes: impl Iterator<Item = &'a HoloHash>,
    hash: &HoloHash,
) -> bool {
    hashes.any(|h| h == hash)
}
