//! Specimen/block/slide entities and the arena that owns them (spec §4.2
//! "Entities").
//!
//! Entities are not passed through `hpath_kernel` stores directly: a store
//! holding a full struct would need to erase it to `Box<dyn Any>` and hand
//! ownership across suspension points, which fights the borrow checker the
//! moment two in-flight processes want to read the same parent. Instead the
//! stores and resource requests carry plain `Copy` id newtypes, and the
//! actual data lives in [`Entities`], a set of arenas reachable from every
//! stage closure through a shared `Rc`. The kernel's single-dispatch
//! invariant (only one process ever runs at a time) makes the arena's
//! `RefCell` borrows safe: nothing re-enters a borrow while it's held.

use hpath_kernel::Priority;
use std::cell::RefCell;

/// Index into [`Entities::specimens`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecimenId(pub usize);

/// Index into [`Entities::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// Index into [`Entities::slides`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlideId(pub usize);

/// Where a specimen was referred from (spec §4.4 "Arrivals").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Internal,
    External,
}

/// Which cut-up path a specimen took (spec §4.5 "Cut-up").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutupType {
    Bms,
    Pool,
    Large,
}

/// The block category assigned at cut-up (spec §4.5, §4.6 "Processing").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    SmallSurgical,
    LargeSurgical,
    Mega,
}

/// The slide category assigned at microtomy, driving which staining/scanning
/// machine queue it joins (spec §4.7 "Microtomy", §4.8 "Staining and
/// scanning").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideType {
    Levels,
    Serials,
    Larges,
    Megas,
}

impl SlideType {
    /// Only megas slides use the dedicated mega machines; everything else
    /// shares the regular queue (spec §4.8).
    pub fn is_mega(self) -> bool {
        matches!(self, SlideType::Megas)
    }
}

/// Stage entry/exit timestamps, used for turnaround-time KPIs (spec §4.10
/// "KPI extraction: stage TAT").
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimestamps {
    pub reception_start: Option<f64>,
    pub reception_end: Option<f64>,
    pub cutup_start: Option<f64>,
    pub cutup_end: Option<f64>,
    pub processing_start: Option<f64>,
    pub processing_end: Option<f64>,
    pub microtomy_start: Option<f64>,
    pub microtomy_end: Option<f64>,
    pub staining_start: Option<f64>,
    pub staining_end: Option<f64>,
    pub labelling_start: Option<f64>,
    pub labelling_end: Option<f64>,
    pub scanning_start: Option<f64>,
    pub scanning_end: Option<f64>,
    pub qc_start: Option<f64>,
    pub qc_end: Option<f64>,
    pub report_start: Option<f64>,
    pub report_end: Option<f64>,
}

impl StageTimestamps {
    /// Every named `(stage, start, end)` triple with both ends present,
    /// in pipeline order; drives `kpis::tat_by_stage`.
    pub fn stage_durations(&self) -> Vec<(&'static str, f64)> {
        let pairs: [(&'static str, Option<f64>, Option<f64>); 9] = [
            ("reception", self.reception_start, self.reception_end),
            ("cutup", self.cutup_start, self.cutup_end),
            ("processing", self.processing_start, self.processing_end),
            ("microtomy", self.microtomy_start, self.microtomy_end),
            ("staining", self.staining_start, self.staining_end),
            ("labelling", self.labelling_start, self.labelling_end),
            ("scanning", self.scanning_start, self.scanning_end),
            ("qc", self.qc_start, self.qc_end),
            ("reporting", self.report_start, self.report_end),
        ];
        pairs
            .into_iter()
            .filter_map(|(name, start, end)| Some((name, end? - start?)))
            .collect()
    }
}

/// A patient specimen moving through the pipeline (spec §4.2, §4.4).
#[derive(Debug, Clone)]
pub struct Specimen {
    pub id: SpecimenId,
    pub priority: Priority,
    pub cancer: bool,
    pub source: Source,
    pub cutup_type: Option<CutupType>,
    /// Set once cut-up decides how many blocks this specimen will have;
    /// `collate.processing` counts down against it (spec §4.6).
    pub num_blocks: u32,
    /// Accumulated across all of this specimen's blocks during microtomy
    /// (spec §4.7).
    pub total_slides: u32,
    /// Every block cut from this specimen, in cut-up order; microtomy and
    /// staining/scanning start walk this to enumerate slides per specimen.
    pub blocks: Vec<BlockId>,
    pub timestamps: StageTimestamps,
}

impl Specimen {
    pub fn new(id: SpecimenId, priority: Priority, cancer: bool, source: Source) -> Self {
        Self {
            id,
            priority,
            cancer,
            source,
            cutup_type: None,
            num_blocks: 0,
            total_slides: 0,
            blocks: Vec::new(),
            timestamps: StageTimestamps::default(),
        }
    }
}

/// A tissue block cut from a specimen (spec §4.2, §4.5).
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub parent: SpecimenId,
    pub priority: Priority,
    pub block_type: BlockType,
    /// Set once microtomy decides how many slides this block will have;
    /// `collate.staining.blocks` / `collate.scanning.blocks` count down
    /// against it (spec §4.8).
    pub num_slides: u32,
    /// Every slide cut from this block, in microtomy order.
    pub slides: Vec<SlideId>,
}

impl Block {
    pub fn new(id: BlockId, parent: SpecimenId, priority: Priority, block_type: BlockType) -> Self {
        Self {
            id,
            parent,
            priority,
            block_type,
            num_slides: 0,
            slides: Vec::new(),
        }
    }
}

/// A single slide cut from a block (spec §4.2, §4.7).
#[derive(Debug, Clone)]
pub struct Slide {
    pub id: SlideId,
    pub parent: BlockId,
    pub priority: Priority,
    pub slide_type: SlideType,
}

impl Slide {
    pub fn new(id: SlideId, parent: BlockId, priority: Priority, slide_type: SlideType) -> Self {
        Self {
            id,
            parent,
            priority,
            slide_type,
        }
    }
}

/// A non-urgent group of items moving together between stages (spec §4.3.3
/// "Batching process": "batches are always non-urgent by construction").
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub priority: Priority,
}

impl<T> Batch<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            priority: Priority::Routine,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type SpecimenBatch = Batch<SpecimenId>;
pub type BlockBatch = Batch<BlockId>;
pub type SlideBatch = Batch<SlideId>;

/// What a [`crate::operators::spawn_delivery_process`] input store actually
/// holds: either one urgent entity fast-tracked around its batcher, or a
/// completed non-urgent batch (spec §4.3.4 "Delivery process": "the same
/// in-queue receives both").
#[derive(Debug, Clone)]
pub enum DeliveryItem<T> {
    Single(T),
    Batch(Batch<T>),
}

/// Owns every specimen/block/slide ever created during a run. Indices are
/// stable for the lifetime of the arena; nothing is ever removed (spec §4.2:
/// "entities persist until the run ends, to support KPI extraction over
/// completed specimens").
#[derive(Debug, Default)]
pub struct Entities {
    pub specimens: RefCell<Vec<Specimen>>,
    pub blocks: RefCell<Vec<Block>>,
    pub slides: RefCell<Vec<Slide>>,
}

impl Entities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_specimen(&self, priority: Priority, cancer: bool, source: Source) -> SpecimenId {
        let mut specimens = self.specimens.borrow_mut();
        let id = SpecimenId(specimens.len());
        specimens.push(Specimen::new(id, priority, cancer, source));
        id
    }

    pub fn new_block(&self, parent: SpecimenId, priority: Priority, block_type: BlockType) -> BlockId {
        let mut blocks = self.blocks.borrow_mut();
        let id = BlockId(blocks.len());
        blocks.push(Block::new(id, parent, priority, block_type));
        id
    }

    pub fn new_slide(&self, parent: BlockId, priority: Priority, slide_type: SlideType) -> SlideId {
        let mut slides = self.slides.borrow_mut();
        let id = SlideId(slides.len());
        slides.push(Slide::new(id, parent, priority, slide_type));
        id
    }

    pub fn specimen(&self, id: SpecimenId) -> std::cell::Ref<'_, Specimen> {
        std::cell::Ref::map(self.specimens.borrow(), |s| &s[id.0])
    }

    pub fn specimen_mut(&self, id: SpecimenId) -> std::cell::RefMut<'_, Specimen> {
        std::cell::RefMut::map(self.specimens.borrow_mut(), |s| &mut s[id.0])
    }

    pub fn block(&self, id: BlockId) -> std::cell::Ref<'_, Block> {
        std::cell::Ref::map(self.blocks.borrow(), |b| &b[id.0])
    }

    pub fn block_mut(&self, id: BlockId) -> std::cell::RefMut<'_, Block> {
        std::cell::RefMut::map(self.blocks.borrow_mut(), |b| &mut b[id.0])
    }

    pub fn slide(&self, id: SlideId) -> std::cell::Ref<'_, Slide> {
        std::cell::Ref::map(self.slides.borrow(), |s| &s[id.0])
    }

    pub fn slide_count(&self) -> usize {
        self.slides.borrow().len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    pub fn specimen_count(&self) -> usize {
        self.specimens.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_assigns_sequential_ids() {
        let entities = Entities::new();
        let s0 = entities.new_specimen(Priority::Routine, false, Source::Internal);
        let s1 = entities.new_specimen(Priority::Urgent, true, Source::External);
        assert_eq!(s0.0, 0);
        assert_eq!(s1.0, 1);
        assert_eq!(entities.specimen_count(), 2);
    }

    #[test]
    fn block_inherits_parent_priority() {
        let entities = Entities::new();
        let s = entities.new_specimen(Priority::Urgent, false, Source::Internal);
        let b = entities.new_block(s, entities.specimen(s).priority, BlockType::SmallSurgical);
        assert_eq!(entities.block(b).priority, Priority::Urgent);
        assert_eq!(entities.block(b).parent, s);
    }

    #[test]
    fn stage_durations_skips_incomplete_stages() {
        let mut ts = StageTimestamps::default();
        ts.reception_start = Some(1.0);
        ts.reception_end = Some(2.5);
        ts.cutup_start = Some(3.0);
        // cutup_end left unset
        let durations = ts.stage_durations();
        assert_eq!(durations, vec![("reception", 1.5)]);
    }

    #[test]
    fn batch_default_priority_is_routine() {
        let batch: SpecimenBatch = Batch::new();
        assert_eq!(batch.priority, Priority::Routine);
        assert!(batch.is_empty());
    }
}
