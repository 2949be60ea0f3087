use anyhow::{Context as _, Result};
use bytes::{Buf, BufMut};
use commonware_codec::{Encode, EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use plinko_types::{Key, KeyKind, SequenceKind, Value};
use std::{collections::BTreeMap, future::Future};
use thiserror::Error as ThisError;
use tokio::sync::RwLock;

/// Upper bound on records accepted when restoring a snapshot.
const MAX_SNAPSHOT_RECORDS: usize = 1 << 24;

/// Monotonic write stamp assigned by the store on every committed write.
pub type Version = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub version: Version,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Status {
    Update(Value),
    Delete,
}

impl Write for Status {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Status::Update(value) => {
                0u8.write(writer);
                value.write(writer);
            }
            Status::Delete => 1u8.write(writer),
        }
    }
}

impl Read for Status {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        match kind {
            0 => Ok(Status::Update(Value::read(reader)?)),
            1 => Ok(Status::Delete),
            _ => Err(Error::InvalidEnum(kind)),
        }
    }
}

impl EncodeSize for Status {
    fn encode_size(&self) -> usize {
        1 + match self {
            Status::Update(value) => value.encode_size(),
            Status::Delete => 0,
        }
    }
}

/// A compare-and-apply unit of work.
///
/// Every read records the version observed (`None` when the key was absent). The batch commits
/// only if none of those versions moved in the meantime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    reads: BTreeMap<Key, Option<Version>>,
    writes: BTreeMap<Key, Status>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to still be at `version` when the batch commits.
    pub fn expect(&mut self, key: Key, version: Option<Version>) {
        self.reads.entry(key).or_insert(version);
    }

    pub fn update(&mut self, key: Key, value: Value) {
        self.writes.insert(key, Status::Update(value));
    }

    pub fn delete(&mut self, key: Key) {
        self.writes.insert(key, Status::Delete);
    }

    pub fn reads(&self) -> &BTreeMap<Key, Option<Version>> {
        &self.reads
    }

    pub fn writes(&self) -> &BTreeMap<Key, Status> {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

#[derive(Debug, ThisError)]
pub enum CommitError {
    #[error("record changed since it was read: {0:?}")]
    Conflict(Key),
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Versioned key-value storage behind the ledger.
pub trait State: Send + Sync {
    fn get(&self, key: &Key) -> impl Future<Output = Result<Option<Record>>> + Send;

    /// All records of one family, in key order.
    fn scan(&self, kind: KeyKind) -> impl Future<Output = Result<Vec<(Key, Record)>>> + Send;

    /// Atomically validate the batch's read set and apply its write set.
    fn commit(&self, batch: Batch) -> impl Future<Output = Result<(), CommitError>> + Send;

    /// Reserve the next id of `kind`.
    ///
    /// Ids are unique and increasing but may have gaps. Allocation never joins a batch's read
    /// set, so unrelated writers do not conflict over a shared counter.
    fn allocate(&self, kind: SequenceKind) -> impl Future<Output = Result<u64>> + Send;

    fn put(&self, key: Key, value: Value) -> impl Future<Output = Result<(), CommitError>> + Send {
        async move {
            let mut batch = Batch::new();
            batch.update(key, value);
            self.commit(batch).await
        }
    }
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<Key, Record>,
    clock: Version,
}

/// In-process store.
#[derive(Default)]
pub struct Memory {
    inner: RwLock<Inner>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode every record (without versions).
    pub async fn snapshot(&self) -> Vec<u8> {
        let inner = self.inner.read().await;
        let entries: Vec<(Key, Value)> = inner
            .records
            .iter()
            .map(|(key, record)| (key.clone(), record.value.clone()))
            .collect();
        entries.encode().to_vec()
    }

    /// Rebuild a store from [`Memory::snapshot`] output.
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let entries = Vec::<(Key, Value)>::read_range(&mut reader, 0..=MAX_SNAPSHOT_RECORDS)
            .map_err(|err| anyhow::anyhow!("decode snapshot: {err}"))?;
        if reader.has_remaining() {
            anyhow::bail!("snapshot has {} trailing bytes", reader.remaining());
        }
        let mut inner = Inner::default();
        for (key, value) in entries {
            inner.clock += 1;
            inner.records.insert(
                key,
                Record {
                    version: inner.clock,
                    value,
                },
            );
        }
        Ok(Self {
            inner: RwLock::new(inner),
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

impl State for Memory {
    async fn get(&self, key: &Key) -> Result<Option<Record>> {
        Ok(self.inner.read().await.records.get(key).cloned())
    }

    async fn scan(&self, kind: KeyKind) -> Result<Vec<(Key, Record)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|(key, _)| key.kind() == kind)
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect())
    }

    async fn commit(&self, batch: Batch) -> Result<(), CommitError> {
        let mut inner = self.inner.write().await;
        for (key, expected) in &batch.reads {
            let current = inner.records.get(key).map(|record| record.version);
            if current != *expected {
                return Err(CommitError::Conflict(key.clone()));
            }
        }
        for (key, status) in batch.writes {
            match status {
                Status::Update(value) => {
                    inner.clock += 1;
                    let version = inner.clock;
                    inner.records.insert(key, Record { version, value });
                }
                Status::Delete => {
                    inner.records.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn allocate(&self, kind: SequenceKind) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let key = Key::Sequence(kind);
        let next = match inner.records.get(&key).map(|record| &record.value) {
            None => 1,
            Some(Value::Sequence(next)) => *next,
            Some(other) => anyhow::bail!("unexpected value {other:?} stored under {key:?}"),
        };
        inner.clock += 1;
        let version = inner.clock;
        inner.records.insert(
            key,
            Record {
                version,
                value: Value::Sequence(next + 1),
            },
        );
        Ok(next)
    }
}

/// Read-your-writes overlay used while computing a batch.
pub struct Staged<'a, S: State> {
    state: &'a S,
    batch: Batch,
}

impl<'a, S: State> Staged<'a, S> {
    pub fn new(state: &'a S) -> Self {
        Self {
            state,
            batch: Batch::new(),
        }
    }

    pub async fn get(&mut self, key: &Key) -> Result<Option<Value>> {
        if let Some(status) = self.batch.writes.get(key) {
            return Ok(match status {
                Status::Update(value) => Some(value.clone()),
                Status::Delete => None,
            });
        }
        let record = self.state.get(key).await.context("staged read")?;
        self.batch
            .expect(key.clone(), record.as_ref().map(|record| record.version));
        Ok(record.map(|record| record.value))
    }

    /// Every record of `kind`, including this batch's own writes.
    pub async fn scan(&mut self, kind: KeyKind) -> Result<Vec<(Key, Value)>> {
        let mut merged = BTreeMap::new();
        for (key, record) in self.state.scan(kind).await.context("staged scan")? {
            self.batch.expect(key.clone(), Some(record.version));
            merged.insert(key, record.value);
        }
        for (key, status) in &self.batch.writes {
            if key.kind() != kind {
                continue;
            }
            match status {
                Status::Update(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                Status::Delete => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    pub fn insert(&mut self, key: Key, value: Value) {
        self.batch.update(key, value);
    }

    pub fn delete(&mut self, key: Key) {
        self.batch.delete(key);
    }

    pub fn into_batch(self) -> Batch {
        self.batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinko_types::{Account, AccountId};
    use std::sync::Arc;

    fn account(id: &str) -> (Key, Value) {
        let id = AccountId::new(id).unwrap();
        (Key::Account(id.clone()), Value::Account(Account::new(id, 0)))
    }

    #[tokio::test]
    async fn commit_rejects_moved_reads() {
        let store = Memory::new();
        let (key, value) = account("alice");
        store.put(key.clone(), value.clone()).await.unwrap();

        let mut first = Staged::new(&store);
        let mut second = Staged::new(&store);
        assert!(first.get(&key).await.unwrap().is_some());
        assert!(second.get(&key).await.unwrap().is_some());
        first.insert(key.clone(), value.clone());
        second.insert(key.clone(), value);

        store.commit(first.into_batch()).await.unwrap();
        let err = store.commit(second.into_batch()).await.unwrap_err();
        assert!(matches!(err, CommitError::Conflict(k) if k == key));
    }

    #[tokio::test]
    async fn absent_reads_conflict_with_inserts() {
        let store = Memory::new();
        let key = Key::Sequence(SequenceKind::Bet);

        let mut staged = Staged::new(&store);
        assert_eq!(staged.get(&key).await.unwrap(), None);
        staged.insert(key.clone(), Value::Sequence(1));

        store.put(key.clone(), Value::Sequence(5)).await.unwrap();
        assert!(matches!(
            store.commit(staged.into_batch()).await,
            Err(CommitError::Conflict(_))
        ));
        assert_eq!(store.get(&key).await.unwrap().unwrap().value, Value::Sequence(5));
    }

    #[tokio::test]
    async fn staged_reads_see_own_writes() {
        let store = Memory::new();
        let (key, value) = account("bob");
        store.put(key.clone(), value).await.unwrap();

        let mut staged = Staged::new(&store);
        staged.delete(key.clone());
        assert_eq!(staged.get(&key).await.unwrap(), None);
        let batch = staged.into_batch();
        assert!(batch.reads().is_empty());
        store.commit(batch).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn versions_never_repeat_across_delete() {
        let store = Memory::new();
        let (key, value) = account("carol");
        store.put(key.clone(), value.clone()).await.unwrap();
        let first = store.get(&key).await.unwrap().unwrap().version;

        let mut batch = Batch::new();
        batch.delete(key.clone());
        store.commit(batch).await.unwrap();
        store.put(key.clone(), value).await.unwrap();
        let second = store.get(&key).await.unwrap().unwrap().version;
        assert!(second > first);
    }

    #[tokio::test]
    async fn allocation_is_unique_per_kind() {
        let store = Memory::new();
        assert_eq!(store.allocate(SequenceKind::Bet).await.unwrap(), 1);
        assert_eq!(store.allocate(SequenceKind::Bet).await.unwrap(), 2);
        assert_eq!(store.allocate(SequenceKind::Transaction).await.unwrap(), 1);

        let store = Arc::new(store);
        let tasks = (0..64).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.allocate(SequenceKind::Bet).await.unwrap() })
        });
        let mut ids: Vec<u64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|id| id.unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 64);
        assert_eq!(ids.first(), Some(&3));
    }

    #[tokio::test]
    async fn allocation_survives_a_snapshot() {
        let store = Memory::new();
        for _ in 0..3 {
            store.allocate(SequenceKind::Transaction).await.unwrap();
        }
        let restored = Memory::restore(&store.snapshot().await).unwrap();
        assert_eq!(restored.allocate(SequenceKind::Transaction).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn snapshot_restores_all_records() {
        let store = Memory::new();
        for id in ["dave", "erin", "frank"] {
            let (key, value) = account(id);
            store.put(key, value).await.unwrap();
        }
        store
            .put(Key::Sequence(SequenceKind::Transaction), Value::Sequence(12))
            .await
            .unwrap();

        let bytes = store.snapshot().await;
        let restored = Memory::restore(&bytes).unwrap();
        assert_eq!(restored.len().await, 4);
        let accounts = restored.scan(KeyKind::Account).await.unwrap();
        assert_eq!(accounts.len(), 3);
        assert_eq!(
            restored
                .get(&Key::Sequence(SequenceKind::Transaction))
                .await
                .unwrap()
                .map(|record| record.value),
            Some(Value::Sequence(12))
        );

        let mut corrupt = bytes.clone();
        corrupt.push(0);
        assert!(Memory::restore(&corrupt).is_err());
    }
}
