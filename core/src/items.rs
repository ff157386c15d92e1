//! Keyed merge of fetched and streamed activity.

use std::cmp::Ordering;

use activity_feed_api::ActivityItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Fetched,
    Streamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    item: ActivityItem,
    origin: Origin,
    /// Server position for fetched entries, arrival counter for streamed ones.
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The id was new.
    Inserted,
    /// The id existed with different content and was replaced.
    Replaced,
    /// The exact item was already present.
    Unchanged,
}

impl MergeOutcome {
    pub fn changed(self) -> bool {
        !matches!(self, MergeOutcome::Unchanged)
    }
}

/// Activity items unique by id, kept in display order: newest `created_at`
/// first; on equal timestamps streamed items precede fetched ones, later
/// stream arrivals come first and fetched items keep server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItems {
    entries: Vec<Entry>,
    next_stream_seq: u64,
}

impl FeedItems {
    /// Seed from the initial fetch. If the server repeats an id the first
    /// occurrence is kept.
    pub fn from_initial(items: Vec<ActivityItem>) -> Self {
        let mut entries: Vec<Entry> = Vec::with_capacity(items.len());
        for (seq, item) in items.into_iter().enumerate() {
            if entries.iter().any(|entry| entry.item.id == item.id) {
                continue;
            }
            entries.push(Entry {
                item,
                origin: Origin::Fetched,
                seq: seq as u64,
            });
        }
        entries.sort_by(display_order);
        Self {
            entries,
            next_stream_seq: 0,
        }
    }

    /// Merge one streamed item. A stream item always wins over whatever is
    /// stored under its id and moves to its arrival position.
    pub fn apply(&mut self, item: ActivityItem) -> MergeOutcome {
        let existing = self
            .entries
            .iter()
            .position(|entry| entry.item.id == item.id);
        let outcome = match existing {
            Some(index) if self.entries[index].item == item => return MergeOutcome::Unchanged,
            Some(index) => {
                self.entries.remove(index);
                MergeOutcome::Replaced
            }
            None => MergeOutcome::Inserted,
        };

        let entry = Entry {
            item,
            origin: Origin::Streamed,
            seq: self.next_stream_seq,
        };
        self.next_stream_seq += 1;
        let index = self
            .entries
            .partition_point(|existing| display_order(existing, &entry) == Ordering::Less);
        self.entries.insert(index, entry);
        outcome
    }

    /// Reducer form of [`FeedItems::apply`]: `self` is left untouched.
    pub fn merged(&self, item: ActivityItem) -> Self {
        let mut next = self.clone();
        next.apply(item);
        next
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivityItem> {
        self.entries.iter().map(|entry| &entry.item)
    }

    pub fn get(&self, id: &str) -> Option<&ActivityItem> {
        self.iter().find(|item| item.id == id)
    }

    pub fn to_vec(&self) -> Vec<ActivityItem> {
        self.iter().cloned().collect()
    }
}

fn display_order(a: &Entry, b: &Entry) -> Ordering {
    b.item
        .created_at
        .cmp(&a.item.created_at)
        .then_with(|| match (a.origin, b.origin) {
            (Origin::Streamed, Origin::Fetched) => Ordering::Less,
            (Origin::Fetched, Origin::Streamed) => Ordering::Greater,
            (Origin::Streamed, Origin::Streamed) => b.seq.cmp(&a.seq),
            (Origin::Fetched, Origin::Fetched) => a.seq.cmp(&b.seq),
        })
}
