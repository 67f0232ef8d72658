use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::EntityId;
use crate::models::feature::{Row, Value};

/// A fixed table of observations, one [`Row`] per entity.
///
/// Produces the `(entity_id, observation)` streams consumed by
/// [`MixtureModel::bootstrap`](crate::models::mixture::MixtureModel::bootstrap)
/// and the assignment kernels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    #[must_use]
    pub const fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Stack clusters of rows on top of each other, numbering entities in
    /// concatenation order (the same order [`fill`] uses).
    ///
    /// [`fill`]: crate::models::mixture::MixtureModel::fill
    #[must_use]
    pub fn from_clusters(clusters: &[Vec<Row>]) -> Self {
        Self {
            rows: clusters.iter().flatten().cloned().collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn row(&self, eid: EntityId) -> Option<&[Value]> {
        self.rows.get(eid).map(Vec::as_slice)
    }

    /// Every entity in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &[Value])> {
        self.rows.iter().map(Vec::as_slice).enumerate()
    }

    /// Every entity in a random order.
    pub fn shuffled<R: Rng>(&self, rng: &mut R) -> Vec<(EntityId, &[Value])> {
        let mut entities: Vec<_> = self.iter().collect();
        entities.shuffle(rng);
        entities
    }

    /// Every entity, shuffled if `shuffle` is set.
    pub fn data<R: Rng>(&self, shuffle: bool, rng: &mut R) -> Vec<(EntityId, &[Value])> {
        if shuffle {
            self.shuffled(rng)
        } else {
            self.iter().collect()
        }
    }
}

impl From<Vec<Row>> for Dataset {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn clusters_stack_in_order() {
        let clusters = vec![
            vec![vec![Value::Real(1.0)], vec![Value::Real(2.0)]],
            vec![],
            vec![vec![Value::Real(3.0)]],
        ];
        let data = Dataset::from_clusters(&clusters);

        assert_eq!(data.len(), 3);
        assert_eq!(data.row(2), Some(&[Value::Real(3.0)][..]));
        assert_eq!(
            data.iter().map(|(eid, _)| eid).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn shuffle_covers_every_entity() {
        let mut rng = SmallRng::seed_from_u64(0x1234);
        let data = Dataset::new((0..20).map(|i| vec![Value::Category(i)]).collect());

        let mut seen: Vec<EntityId> = data.shuffled(&mut rng).into_iter().map(|(e, _)| e).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }
}
