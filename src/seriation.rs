//! Seriation: reordering a ranked result list into a chain of near
//! neighbours.
//!
//! Greedy and quadratic in the list length; callers pass tens of items.

use crate::duplicates::cosine_similarity;
use crate::record::Record;

/// Anything that may carry a text embedding.
pub trait Embedded {
    /// The embedding, or `None` when missing or stale.
    fn embedding(&self) -> Option<&[f32]>;
}

impl Embedded for Record {
    fn embedding(&self) -> Option<&[f32]> {
        Record::embedding(self)
    }
}

impl<T: Embedded + ?Sized> Embedded for &T {
    fn embedding(&self) -> Option<&[f32]> {
        (**self).embedding()
    }
}

/// Reorders `items` by a nearest-neighbour walk.
///
/// The first item stays first. Each next item is the remaining embedded
/// item most similar to the last placed embedded item (earliest wins ties).
/// If nothing embedded has been placed yet, the first remaining embedded
/// item is taken. Items without an embedding follow at the end, in their
/// original order.
#[must_use]
pub fn seriate<T: Embedded>(items: Vec<T>) -> Vec<T> {
    if items.len() <= 1 {
        return items;
    }

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut order = Vec::with_capacity(slots.len());
    let mut placed = vec![false; slots.len()];
    order.push(0);
    placed[0] = true;
    let mut anchor = slots[0].as_ref().and_then(|item| item.embedding().map(|_| 0));

    loop {
        let mut remaining = (1..slots.len()).filter(|i| !placed[*i] && has_embedding(&slots[*i]));
        let next = match anchor.and_then(|a| slots[a].as_ref()).and_then(Embedded::embedding) {
            Some(anchor_vec) => {
                let mut best: Option<(usize, f64)> = None;
                for i in remaining {
                    let sim = slots[i]
                        .as_ref()
                        .and_then(Embedded::embedding)
                        .and_then(|v| cosine_similarity(anchor_vec, v))
                        .unwrap_or(f64::MIN);
                    if best.map_or(true, |(_, b)| sim > b) {
                        best = Some((i, sim));
                    }
                }
                best.map(|(i, _)| i)
            }
            None => remaining.next(),
        };
        let Some(next) = next else {
            break;
        };
        order.push(next);
        placed[next] = true;
        anchor = Some(next);
    }

    let leftovers: Vec<usize> = (1..slots.len()).filter(|i| !placed[*i]).collect();
    order.extend(leftovers);
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

/// Keeps the first `limit` items, then seriates them.
#[must_use]
pub fn seriate_top<T: Embedded>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    items.truncate(limit);
    seriate(items)
}

fn has_embedding<T: Embedded>(slot: &Option<T>) -> bool {
    slot.as_ref().is_some_and(|item| item.embedding().is_some())
}
