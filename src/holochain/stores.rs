//! Stores tracking the state of one zome
//!
//! [`ZomeStores`] builds polled stores over a zome client. Each store
//! fetches through the function it is given, polls at the configured
//! interval while subscribed, and applies the zome's
//! [`ActionCommittedSignal`]s to its cached value between polls.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use super::client::ZomeClient;
use super::fetch::{shared, Fetch};
use super::hash::{ActionHash, AnyLinkableHash, HashType};
use super::poll::{poll_store, Reconcile};
use super::reconcile::{
    are_deleted_links_equal, are_hashes_equal, canonical_actions, canonical_deleted_links,
    canonical_links, contains_hash,
};
use super::types::{
    ActionCommittedSignal, Delete, DeletedLink, EntryAction, EntryRecord, Link, SignedActionHashed,
    Update,
};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::retry::retry_until_success;
use crate::store::AsyncStore;

/// Factory for the stores of one zome
///
/// `E` is the zome's entry type enum and `L` its link type enum, as carried
/// by the signals `C` delivers.
pub struct ZomeStores<C, E, L> {
    client: Arc<C>,
    config: StoreConfig,
    _signals: PhantomData<fn() -> (E, L)>,
}

impl<C, E, L> Clone for ZomeStores<C, E, L> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
            _signals: PhantomData,
        }
    }
}

impl<C, E, L> ZomeStores<C, E, L>
where
    C: ZomeClient<ActionCommittedSignal<E, L>>,
    E: Clone + Send + Sync + 'static,
    L: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(client: C, config: StoreConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
            _signals: PhantomData,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Links of `link_type` from `base` that have not been deleted
    ///
    /// An agent base address also matches links whose base is the same key
    /// under the entry hash type.
    pub fn live_links(
        &self,
        base: AnyLinkableHash,
        fetch: impl Fetch<Vec<Link>>,
        link_type: L,
    ) -> AsyncStore<Vec<Link>> {
        let reconciler = LinksReconciler::new(Some(base), link_type);
        poll_store(
            "live_links",
            reconciler,
            shared(fetch),
            self.client.clone(),
            self.config.poll_interval,
        )
    }

    /// Links of `link_type` from any base
    pub fn collection(&self, fetch: impl Fetch<Vec<Link>>, link_type: L) -> AsyncStore<Vec<Link>> {
        let reconciler = LinksReconciler::new(None, link_type);
        poll_store(
            "collection",
            reconciler,
            shared(fetch),
            self.client.clone(),
            self.config.poll_interval,
        )
    }

    /// The newest revision of a mutable entry
    ///
    /// Errors with [`StoreError::NotFound`] when the fetch finds nothing.
    pub fn latest_version_of_entry<T>(
        &self,
        fetch: impl Fetch<Option<EntryRecord<T>>>,
    ) -> AsyncStore<EntryRecord<T>>
    where
        T: TryFrom<E> + Clone + Send + Sync + 'static,
    {
        let reconciler = LatestVersionReconciler::<T, E, L>::default();
        poll_store(
            "latest_version_of_entry",
            reconciler,
            shared(fetch),
            self.client.clone(),
            self.config.poll_interval,
        )
    }

    /// Every revision of a mutable entry, oldest first
    pub fn all_revisions_of_entry<T>(
        &self,
        fetch: impl Fetch<Vec<EntryRecord<T>>>,
    ) -> AsyncStore<Vec<EntryRecord<T>>>
    where
        T: TryFrom<E> + Clone + Send + Sync + 'static,
    {
        let reconciler = AllRevisionsReconciler::<T, E, L>::default();
        poll_store(
            "all_revisions_of_entry",
            reconciler,
            shared(fetch),
            self.client.clone(),
            self.config.poll_interval,
        )
    }

    /// Delete actions targeting `original`
    pub fn deletes_for_entry(
        &self,
        original: ActionHash,
        fetch: impl Fetch<Vec<SignedActionHashed<Delete>>>,
    ) -> AsyncStore<Vec<SignedActionHashed<Delete>>> {
        let reconciler = DeletesReconciler {
            original,
            _signals: PhantomData,
        };
        poll_store(
            "deletes_for_entry",
            reconciler,
            shared(fetch),
            self.client.clone(),
            self.config.poll_interval,
        )
    }

    /// Deleted links of `link_type` from `base`, each with the actions that
    /// deleted it
    pub fn deleted_links(
        &self,
        base: AnyLinkableHash,
        fetch: impl Fetch<Vec<DeletedLink>>,
        link_type: L,
    ) -> AsyncStore<Vec<DeletedLink>> {
        let reconciler = DeletedLinksReconciler {
            filter: LinkFilter::new(Some(base), link_type),
            _entries: PhantomData,
        };
        poll_store(
            "deleted_links",
            reconciler,
            shared(fetch),
            self.client.clone(),
            self.config.poll_interval,
        )
    }

    /// An entry that never changes once written
    ///
    /// Retries with the configured retry interval and attempt count; see
    /// [`immutable_entry`].
    pub fn immutable_entry<T>(
        &self,
        fetch: impl Fetch<Option<EntryRecord<T>>>,
    ) -> AsyncStore<EntryRecord<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        immutable_entry(fetch, self.config.retry_interval, self.config.max_retries)
    }
}

/// A value that never changes once it exists
///
/// A fetch returning `None` counts as a failed attempt. After `max_retries`
/// attempts without a value the store holds [`StoreError::NotFound`] (or the
/// last transport error). A found value is kept across deactivations.
pub fn immutable_entry<T>(
    fetch: impl Fetch<Option<T>>,
    interval: Duration,
    max_retries: u32,
) -> AsyncStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    let fetch = shared(fetch);
    retry_until_success(
        move || {
            let fetch = fetch.clone();
            async move { fetch.fetch().await?.ok_or(StoreError::NotFound) }
        },
        interval,
        max_retries,
    )
}

/// Link type and base address a link signal must carry to apply
struct LinkFilter<L> {
    base: Option<AnyLinkableHash>,
    link_type: L,
}

impl<L: PartialEq> LinkFilter<L> {
    fn new(base: Option<AnyLinkableHash>, link_type: L) -> Self {
        // Links on an agent are matched through its entry form
        let base = base.map(|base| match base.hash_type() {
            Some(HashType::Agent) => base.retype(HashType::Entry),
            _ => base,
        });
        Self { base, link_type }
    }

    fn matches(&self, base: &AnyLinkableHash, link_type: &L) -> bool {
        if *link_type != self.link_type {
            return false;
        }
        match &self.base {
            None => true,
            Some(expected) => {
                base == expected
                    || (base.hash_type() == Some(HashType::Agent)
                        && base.retype(HashType::Entry) == *expected)
            }
        }
    }
}

struct LinksReconciler<E, L> {
    filter: LinkFilter<L>,
    _entries: PhantomData<fn() -> E>,
}

impl<E, L: PartialEq> LinksReconciler<E, L> {
    fn new(base: Option<AnyLinkableHash>, link_type: L) -> Self {
        Self {
            filter: LinkFilter::new(base, link_type),
            _entries: PhantomData,
        }
    }
}

impl<E, L> Reconcile for LinksReconciler<E, L>
where
    E: Clone + Send + Sync + 'static,
    L: Clone + PartialEq + Send + Sync + 'static,
{
    type Fetched = Vec<Link>;
    type Value = Vec<Link>;
    type Signal = ActionCommittedSignal<E, L>;

    fn from_fetched(&self, links: Vec<Link>) -> Result<Vec<Link>> {
        Ok(canonical_links(links))
    }

    fn same(&self, a: &Vec<Link>, b: &Vec<Link>) -> bool {
        are_hashes_equal(
            a.iter().map(|link| &link.create_link_hash),
            b.iter().map(|link| &link.create_link_hash),
        )
    }

    fn apply_signal(&self, current: &Vec<Link>, signal: &Self::Signal) -> Option<Vec<Link>> {
        match signal {
            ActionCommittedSignal::LinkCreated { action, link_type }
                if self.filter.matches(&action.content().base_address, link_type) =>
            {
                let mut links = current.clone();
                links.push(Link::from(action));
                Some(canonical_links(links))
            }
            ActionCommittedSignal::LinkDeleted {
                create_link_action,
                link_type,
                ..
            } if self.filter.matches(&create_link_action.content().base_address, link_type) => {
                let deleted = create_link_action.hash();
                if !contains_hash(current.iter().map(|link| &link.create_link_hash), deleted) {
                    return None;
                }
                Some(
                    current
                        .iter()
                        .filter(|link| &link.create_link_hash != deleted)
                        .cloned()
                        .collect(),
                )
            }
            _ => None,
        }
    }
}

struct LatestVersionReconciler<T, E, L> {
    _types: PhantomData<fn() -> (T, E, L)>,
}

impl<T, E, L> Default for LatestVersionReconciler<T, E, L> {
    fn default() -> Self {
        Self { _types: PhantomData }
    }
}

/// The record an update signal describes, if its entry decodes to `T`
fn updated_record<T: TryFrom<E>, E: Clone>(
    action: &SignedActionHashed<Update>,
    app_entry: &E,
) -> Option<EntryRecord<T>> {
    let entry = T::try_from(app_entry.clone()).ok()?;
    Some(EntryRecord::new(action.clone().map_content(EntryAction::Update), entry))
}

impl<T, E, L> Reconcile for LatestVersionReconciler<T, E, L>
where
    T: TryFrom<E> + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
{
    type Fetched = Option<EntryRecord<T>>;
    type Value = EntryRecord<T>;
    type Signal = ActionCommittedSignal<E, L>;

    fn from_fetched(&self, record: Option<EntryRecord<T>>) -> Result<EntryRecord<T>> {
        record.ok_or(StoreError::NotFound)
    }

    fn same(&self, a: &EntryRecord<T>, b: &EntryRecord<T>) -> bool {
        a.action_hash() == b.action_hash()
    }

    fn apply_signal(
        &self,
        current: &EntryRecord<T>,
        signal: &Self::Signal,
    ) -> Option<EntryRecord<T>> {
        match signal {
            ActionCommittedSignal::EntryUpdated { action, app_entry, .. }
                if action.content().original_action_address == *current.action_hash() =>
            {
                updated_record(action, app_entry)
            }
            _ => None,
        }
    }
}

struct AllRevisionsReconciler<T, E, L> {
    _types: PhantomData<fn() -> (T, E, L)>,
}

impl<T, E, L> Default for AllRevisionsReconciler<T, E, L> {
    fn default() -> Self {
        Self { _types: PhantomData }
    }
}

impl<T, E, L> Reconcile for AllRevisionsReconciler<T, E, L>
where
    T: TryFrom<E> + Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
{
    type Fetched = Vec<EntryRecord<T>>;
    type Value = Vec<EntryRecord<T>>;
    type Signal = ActionCommittedSignal<E, L>;

    fn from_fetched(&self, records: Vec<EntryRecord<T>>) -> Result<Vec<EntryRecord<T>>> {
        let mut revisions: Vec<EntryRecord<T>> = Vec::with_capacity(records.len());
        for record in records {
            let hashes = revisions.iter().map(EntryRecord::action_hash);
            if !contains_hash(hashes, record.action_hash()) {
                revisions.push(record);
            }
        }
        revisions.sort_by_key(EntryRecord::timestamp);
        Ok(revisions)
    }

    fn same(&self, a: &Vec<EntryRecord<T>>, b: &Vec<EntryRecord<T>>) -> bool {
        are_hashes_equal(
            a.iter().map(EntryRecord::action_hash),
            b.iter().map(EntryRecord::action_hash),
        )
    }

    fn apply_signal(
        &self,
        current: &Vec<EntryRecord<T>>,
        signal: &Self::Signal,
    ) -> Option<Vec<EntryRecord<T>>> {
        let ActionCommittedSignal::EntryUpdated { action, app_entry, .. } = signal else {
            return None;
        };
        let known =
            |hash: &ActionHash| contains_hash(current.iter().map(EntryRecord::action_hash), hash);
        if !known(&action.content().original_action_address) || known(action.hash()) {
            return None;
        }

        let mut revisions = current.clone();
        revisions.push(updated_record(action, app_entry)?);
        Some(revisions)
    }
}

struct DeletesReconciler<E, L> {
    original: ActionHash,
    _signals: PhantomData<fn() -> (E, L)>,
}

impl<E, L> Reconcile for DeletesReconciler<E, L>
where
    E: Clone + Send + Sync + 'static,
    L: Clone + Send + Sync + 'static,
{
    type Fetched = Vec<SignedActionHashed<Delete>>;
    type Value = Vec<SignedActionHashed<Delete>>;
    type Signal = ActionCommittedSignal<E, L>;

    fn from_fetched(&self, deletes: Self::Fetched) -> Result<Self::Value> {
        Ok(canonical_actions(deletes))
    }

    fn same(&self, a: &Self::Value, b: &Self::Value) -> bool {
        are_hashes_equal(
            a.iter().map(SignedActionHashed::hash),
            b.iter().map(SignedActionHashed::hash),
        )
    }

    fn apply_signal(&self, current: &Self::Value, signal: &Self::Signal) -> Option<Self::Value> {
        match signal {
            ActionCommittedSignal::EntryDeleted { action, .. }
                if action.content().deletes_address == self.original =>
            {
                let mut deletes = current.clone();
                deletes.push(action.clone());
                Some(canonical_actions(deletes))
            }
            _ => None,
        }
    }
}

struct DeletedLinksReconciler<E, L> {
    filter: LinkFilter<L>,
    _entries: PhantomData<fn() -> E>,
}

impl<E, L> Reconcile for DeletedLinksReconciler<E, L>
where
    E: Clone + Send + Sync + 'static,
    L: Clone + PartialEq + Send + Sync + 'static,
{
    type Fetched = Vec<DeletedLink>;
    type Value = Vec<DeletedLink>;
    type Signal = ActionCommittedSignal<E, L>;

    fn from_fetched(&self, groups: Vec<DeletedLink>) -> Result<Vec<DeletedLink>> {
        Ok(canonical_deleted_links(groups))
    }

    fn same(&self, a: &Vec<DeletedLink>, b: &Vec<DeletedLink>) -> bool {
        are_deleted_links_equal(a, b)
    }

    fn apply_signal(
        &self,
        current: &Vec<DeletedLink>,
        signal: &Self::Signal,
    ) -> Option<Vec<DeletedLink>> {
        match signal {
            ActionCommittedSignal::LinkDeleted {
                action,
                create_link_action,
                link_type,
            } if self.filter.matches(&create_link_action.content().base_address, link_type) => {
                let mut groups = current.clone();
                groups.push(DeletedLink::new(create_link_action.clone(), vec![action.clone()]));
                Some(canonical_deleted_links(groups))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holochain::client::SignalHub;
    use crate::holochain::fake::{
        fake_agent_pub_key, fake_create_link_from, fake_delete, fake_delete_link, fake_entry_hash,
        fake_record, fake_update, fake_update_record,
    };
    use crate::holochain::types::Timestamp;
    use crate::store::testing::Recorder;
    use crate::store::AsyncResult;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Post {
        title: String,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum EntryTypes {
        Post(Post),
        Comment(String),
    }

    impl TryFrom<EntryTypes> for Post {
        type Error = ();

        fn try_from(entry: EntryTypes) -> std::result::Result<Self, ()> {
            match entry {
                EntryTypes::Post(post) => Ok(post),
                EntryTypes::Comment(_) => Err(()),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum LinkTypes {
        AllPosts,
        PostToComments,
    }

    type Signal = ActionCommittedSignal<EntryTypes, LinkTypes>;

    fn post(title: &str) -> Post {
        Post { title: title.to_string() }
    }

    fn ts(millis: i64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    fn zome() -> (SignalHub<Signal>, ZomeStores<SignalHub<Signal>, EntryTypes, LinkTypes>) {
        let hub = SignalHub::new();
        let stores = ZomeStores::new(hub.clone(), StoreConfig::default());
        (hub, stores)
    }

    fn remote<T: Clone + Send + Sync + 'static>(data: &Arc<Mutex<T>>) -> impl Fetch<T> {
        let data = data.clone();
        move || {
            let data = data.clone();
            async move { Ok::<_, StoreError>(data.lock().unwrap().clone()) }
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn complete<T>(recorder: &Recorder<AsyncResult<T>>) -> T
    where
        T: Clone + Send + Sync + std::fmt::Debug + 'static,
    {
        match recorder.last() {
            Some(AsyncResult::Complete(value)) => value,
            other => panic!("expected a completed value, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_links_follow_link_signals() {
        let (hub, stores) = zome();
        let base = fake_entry_hash();
        let existing = fake_create_link_from(&base, 0, ts(1));
        let data = Arc::new(Mutex::new(vec![Link::from(&existing)]));

        let store = stores.live_links(base.clone(), remote(&data), LinkTypes::AllPosts);
        let recorder = Recorder::new(&store);
        settle().await;

        let created = fake_create_link_from(&base, 0, ts(2));
        hub.emit(&Signal::LinkCreated {
            action: created.clone(),
            link_type: LinkTypes::AllPosts,
        });
        // Other link types and other bases are ignored
        hub.emit(&Signal::LinkCreated {
            action: fake_create_link_from(&base, 1, ts(3)),
            link_type: LinkTypes::PostToComments,
        });
        hub.emit(&Signal::LinkCreated {
            action: fake_create_link_from(&fake_entry_hash(), 0, ts(4)),
            link_type: LinkTypes::AllPosts,
        });

        let links = complete(&recorder);
        assert_eq!(links.len(), 2);
        assert_eq!(&links[1].create_link_hash, created.hash());

        hub.emit(&Signal::LinkDeleted {
            action: fake_delete_link(&existing, ts(5)),
            create_link_action: existing.clone(),
            link_type: LinkTypes::AllPosts,
        });
        let links = complete(&recorder);
        assert_eq!(links.len(), 1);
        assert_eq!(&links[0].create_link_hash, created.hash());
        assert_eq!(recorder.values().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_agent_base_matches_both_forms() {
        let (hub, stores) = zome();
        let agent = fake_agent_pub_key();
        let data = Arc::new(Mutex::new(Vec::new()));

        let store = stores.live_links(agent.clone(), remote(&data), LinkTypes::AllPosts);
        let recorder = Recorder::new(&store);
        settle().await;

        hub.emit(&Signal::LinkCreated {
            action: fake_create_link_from(&agent, 0, ts(1)),
            link_type: LinkTypes::AllPosts,
        });
        hub.emit(&Signal::LinkCreated {
            action: fake_create_link_from(&agent.retype(HashType::Entry), 0, ts(2)),
            link_type: LinkTypes::AllPosts,
        });
        assert_eq!(complete(&recorder).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_ignores_base() {
        let (hub, stores) = zome();
        let data = Arc::new(Mutex::new(Vec::new()));
        let store = stores.collection(remote(&data), LinkTypes::AllPosts);
        let recorder = Recorder::new(&store);
        settle().await;

        for millis in [2, 1] {
            hub.emit(&Signal::LinkCreated {
                action: fake_create_link_from(&fake_entry_hash(), 0, ts(millis)),
                link_type: LinkTypes::AllPosts,
            });
        }
        let links = complete(&recorder);
        assert_eq!(links.len(), 2);
        assert!(links[0].timestamp < links[1].timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_version_not_found() {
        let (_hub, stores) = zome();
        let data: Arc<Mutex<Option<EntryRecord<Post>>>> = Arc::new(Mutex::new(None));
        let store = stores.latest_version_of_entry(remote(&data));
        let recorder = Recorder::new(&store);
        settle().await;

        assert_eq!(recorder.last(), Some(AsyncResult::Error(StoreError::NotFound)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latest_version_follows_updates() {
        let (hub, stores) = zome();
        let original = fake_record(post("first"), ts(1));
        let data = Arc::new(Mutex::new(Some(original.clone())));
        let store = stores.latest_version_of_entry(remote(&data));
        let recorder = Recorder::new(&store);
        settle().await;
        assert_eq!(complete(&recorder).entry, post("first"));

        let update = fake_update(original.action_hash(), ts(2));
        hub.emit(&Signal::EntryUpdated {
            action: update.clone(),
            app_entry: EntryTypes::Post(post("second")),
            original_app_entry: EntryTypes::Post(post("first")),
        });
        let latest = complete(&recorder);
        assert_eq!(latest.action_hash(), update.hash());
        assert_eq!(latest.entry, post("second"));

        // Updates of other revisions and undecodable entries are ignored
        hub.emit(&Signal::EntryUpdated {
            action: fake_update(original.action_hash(), ts(3)),
            app_entry: EntryTypes::Post(post("stale")),
            original_app_entry: EntryTypes::Post(post("first")),
        });
        hub.emit(&Signal::EntryUpdated {
            action: fake_update(update.hash(), ts(4)),
            app_entry: EntryTypes::Comment("not a post".into()),
            original_app_entry: EntryTypes::Post(post("second")),
        });
        assert_eq!(recorder.values().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_revisions_append_updates() {
        let (hub, stores) = zome();
        let original = fake_record(post("v1"), ts(1));
        let second = fake_update_record(post("v2"), original.action_hash(), ts(2));
        let data = Arc::new(Mutex::new(vec![second.clone(), original.clone(), second.clone()]));

        let store = stores.all_revisions_of_entry(remote(&data));
        let recorder = Recorder::new(&store);
        settle().await;
        let revisions = complete(&recorder);
        assert_eq!(
            revisions.iter().map(|r| r.entry.title.as_str()).collect::<Vec<_>>(),
            vec!["v1", "v2"]
        );

        let third = fake_update(second.action_hash(), ts(3));
        let signal = Signal::EntryUpdated {
            action: third.clone(),
            app_entry: EntryTypes::Post(post("v3")),
            original_app_entry: EntryTypes::Post(post("v2")),
        };
        hub.emit(&signal);
        hub.emit(&signal);

        let revisions = complete(&recorder);
        assert_eq!(revisions.len(), 3);
        assert_eq!(revisions[2].action_hash(), third.hash());
        assert_eq!(recorder.values().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_for_entry() {
        let (hub, stores) = zome();
        let original = fake_record(post("doomed"), ts(1));
        let data = Arc::new(Mutex::new(Vec::new()));
        let store = stores.deletes_for_entry(original.action_hash().clone(), remote(&data));
        let recorder = Recorder::new(&store);
        settle().await;
        assert!(complete(&recorder).is_empty());

        let delete = fake_delete(original.action_hash(), ts(2));
        hub.emit(&Signal::EntryDeleted {
            action: delete.clone(),
            original_app_entry: EntryTypes::Post(post("doomed")),
        });
        hub.emit(&Signal::EntryDeleted {
            action: fake_delete(&fake_entry_hash(), ts(3)),
            original_app_entry: EntryTypes::Post(post("other")),
        });

        let deletes = complete(&recorder);
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].hash(), delete.hash());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_links_group_deletes() {
        let (hub, stores) = zome();
        let base = fake_entry_hash();
        let create = fake_create_link_from(&base, 0, ts(1));
        let data = Arc::new(Mutex::new(Vec::new()));

        let store = stores.deleted_links(base.clone(), remote(&data), LinkTypes::AllPosts);
        let recorder = Recorder::new(&store);
        settle().await;

        let late = fake_delete_link(&create, ts(3));
        let early = fake_delete_link(&create, ts(2));
        for delete in [&late, &early, &early] {
            hub.emit(&Signal::LinkDeleted {
                action: delete.clone(),
                create_link_action: create.clone(),
                link_type: LinkTypes::AllPosts,
            });
        }

        let groups = complete(&recorder);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].create_link_hash(), create.hash());
        assert_eq!(
            groups[0].deletes.iter().map(|d| d.hash().clone()).collect::<Vec<_>>(),
            vec![early.hash().clone(), late.hash().clone()]
        );
        // Pending, empty, one delete, two deletes; the duplicate is silent
        assert_eq!(recorder.values().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immutable_entry_retries_until_found() {
        let config = StoreConfig::default().with_retry_interval(Duration::from_millis(100));
        let stores: ZomeStores<_, EntryTypes, LinkTypes> =
            ZomeStores::new(SignalHub::<Signal>::new(), config);

        let calls = Arc::new(AtomicU32::new(0));
        let record = fake_record(post("fixed"), ts(1));
        let counter = calls.clone();
        let found = record.clone();
        let store = stores.immutable_entry(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let found = found.clone();
            async move { Ok::<_, StoreError>((attempt >= 2).then_some(found)) }
        });

        let recorder = Recorder::new(&store);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(recorder.last(), Some(AsyncResult::Complete(record)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Kept after the last subscriber leaves
        drop(recorder);
        let again = Recorder::new(&store);
        settle().await;
        assert!(again.last().is_some_and(|r| r.is_complete()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
