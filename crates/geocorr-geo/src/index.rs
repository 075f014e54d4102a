use geocorr_core::models::Borehole;
use geo::{Coord, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// Borehole collar location with its ID
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBorehole {
    pub hole_id: String,
    pub location: Coord<f64>,
}

impl RTreeObject for IndexedBorehole {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.x, self.location.y])
    }
}

/// R-tree over borehole locations, used to prefilter match candidates
#[derive(Debug, Clone)]
pub struct BoreholeIndex {
    tree: RTree<IndexedBorehole>,
}

impl BoreholeIndex {
    pub fn from_boreholes<'a, I>(boreholes: I) -> Self
    where
        I: IntoIterator<Item = &'a Borehole>,
    {
        let indexed: Vec<IndexedBorehole> = boreholes
            .into_iter()
            .map(|hole| IndexedBorehole { hole_id: hole.id.clone(), location: hole.coord() })
            .collect();

        Self { tree: RTree::bulk_load(indexed) }
    }

    /// Query boreholes within a bounding box
    pub fn query_bbox(&self, min: [f64; 2], max: [f64; 2]) -> Vec<&IndexedBorehole> {
        let bbox = AABB::from_corners(min, max);
        self.tree.locate_in_envelope(&bbox).collect()
    }

    /// Boreholes inside `rect` grown by `margin` on every side
    pub fn query_around(&self, rect: &Rect<f64>, margin: f64) -> Vec<&IndexedBorehole> {
        let min = rect.min();
        let max = rect.max();
        self.query_bbox([min.x - margin, min.y - margin], [max.x + margin, max.y + margin])
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
