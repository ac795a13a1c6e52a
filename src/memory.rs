// src/memory.rs

//! Segment manager.
//!
//! Segments live in an arena indexed by their ID. Unmapping a segment only
//! marks it dead and pushes the ID on a LIFO free list; the buffer stays
//! around so the next map that reuses the ID can skip the allocation when it
//! is big enough. A dead ID is rejected by every accessor until it is mapped
//! again.

use log::{debug, trace};

use crate::error::VmError;
use crate::Word;

/// The segment holding the running program.
pub const PROGRAM_SEGMENT: Word = 0;
/// Number of segment slots reserved up front.
pub const INITIAL_TABLE_CAPACITY: usize = 1024;
/// Smallest buffer handed to a freshly grown segment, in words.
pub const SMALL_SEGMENT_CAPACITY: usize = 22;

#[derive(Debug, Default)]
struct Segment {
    // `data.len()` is the segment's capacity; only `data[..length]` is visible.
    data: Vec<Word>,
    length: usize,
    live: bool,
}

impl Segment {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn words(&self) -> &[Word] {
        &self.data[..self.length]
    }

    /// Replaces the buffer with a zeroed one of twice `needed` words if it is
    /// smaller than `needed`. The old contents are dropped, not copied.
    ///
    /// Returns `true` when a fresh buffer was installed, i.e. every word is zero.
    fn ensure_capacity(&mut self, needed: usize) -> Result<bool, VmError> {
        if needed <= self.capacity() {
            return Ok(false);
        }
        let new_capacity = needed.saturating_mul(2).max(SMALL_SEGMENT_CAPACITY);
        let mut data = Vec::new();
        data.try_reserve_exact(new_capacity)
            .map_err(|_| VmError::AllocationFailed { words: new_capacity })?;
        data.resize(new_capacity, 0);
        self.data = data;
        Ok(true)
    }
}

/// Counters kept by the segment table over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    pub maps: u64,
    pub unmaps: u64,
    pub program_loads: u64,
    /// Live segments right now, segment 0 included.
    pub live: usize,
    pub peak_live: usize,
}

/// All mapped segments plus the pool of IDs waiting to be reused.
#[derive(Debug)]
pub struct SegmentTable {
    segments: Vec<Segment>,
    free_ids: Vec<Word>,
    stats: SegmentStats,
}

impl SegmentTable {
    /// Creates a table whose segment 0 holds `program`.
    pub fn new(program: Vec<Word>) -> Self {
        let mut segments = Vec::with_capacity(INITIAL_TABLE_CAPACITY);
        segments.push(Segment {
            length: program.len(),
            data: program,
            live: true,
        });
        SegmentTable {
            segments,
            free_ids: Vec::new(),
            stats: SegmentStats {
                live: 1,
                peak_live: 1,
                ..SegmentStats::default()
            },
        }
    }

    fn live(&self, id: Word) -> Result<&Segment, VmError> {
        match self.segments.get(id as usize) {
            Some(seg) if seg.live => Ok(seg),
            _ => Err(VmError::InvalidSegment(id)),
        }
    }

    fn live_mut(&mut self, id: Word) -> Result<&mut Segment, VmError> {
        match self.segments.get_mut(id as usize) {
            Some(seg) if seg.live => Ok(seg),
            _ => Err(VmError::InvalidSegment(id)),
        }
    }

    /// Picks the ID for a new mapping: the most recently freed one, or a new
    /// slot at the end of the arena.
    fn next_id(&mut self) -> Result<Word, VmError> {
        if let Some(id) = self.free_ids.pop() {
            return Ok(id);
        }
        let slot = self.segments.len();
        let id = Word::try_from(slot).map_err(|_| VmError::SegmentIdsExhausted)?;
        if slot == self.segments.capacity() {
            self.segments
                .try_reserve_exact(slot.max(1))
                .map_err(|_| VmError::AllocationFailed { words: slot * 2 })?;
        }
        self.segments.push(Segment::default());
        Ok(id)
    }

    /// Maps a new segment of `length` zeroed words and returns its ID.
    pub fn map(&mut self, length: Word) -> Result<Word, VmError> {
        let length = length as usize;
        let id = self.next_id()?;
        let seg = &mut self.segments[id as usize];
        if !seg.ensure_capacity(length)? {
            seg.data[..length].fill(0);
        }
        seg.length = length;
        seg.live = true;

        self.stats.maps += 1;
        self.stats.live += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live);
        trace!("mapped segment {} ({} words)", id, length);
        Ok(id)
    }

    /// Releases segment `id`; the ID is handed out again by a later [`map`](Self::map).
    pub fn unmap(&mut self, id: Word) -> Result<(), VmError> {
        if id == PROGRAM_SEGMENT {
            return Err(VmError::UnmapProgramSegment);
        }
        self.live_mut(id)?.live = false;
        self.free_ids.push(id);

        self.stats.unmaps += 1;
        self.stats.live -= 1;
        trace!("unmapped segment {}", id);
        Ok(())
    }

    #[inline]
    pub fn load(&self, id: Word, offset: Word) -> Result<Word, VmError> {
        let seg = self.live(id)?;
        seg.words()
            .get(offset as usize)
            .copied()
            .ok_or(VmError::SegmentOutOfBounds { segment: id, offset, length: seg.length })
    }

    #[inline]
    pub fn store(&mut self, id: Word, offset: Word, value: Word) -> Result<(), VmError> {
        let seg = self.live_mut(id)?;
        let length = seg.length;
        match seg.data[..length].get_mut(offset as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::SegmentOutOfBounds { segment: id, offset, length }),
        }
    }

    /// Replaces the program in segment 0 with a copy of segment `id`.
    /// Loading segment 0 itself does nothing.
    pub fn install_program(&mut self, id: Word) -> Result<(), VmError> {
        if id == PROGRAM_SEGMENT {
            return Ok(());
        }
        self.live(id)?;

        let (head, tail) = self.segments.split_at_mut(id as usize);
        let program = &mut head[PROGRAM_SEGMENT as usize];
        let source = &tail[0];
        program.ensure_capacity(source.length)?;
        program.data[..source.length].copy_from_slice(source.words());
        program.length = source.length;

        self.stats.program_loads += 1;
        debug!("loaded segment {} as program ({} words)", id, source.length);
        Ok(())
    }

    /// Fetches the instruction word at `pc` in segment 0.
    #[inline]
    pub fn fetch(&self, pc: Word) -> Option<Word> {
        self.segments[PROGRAM_SEGMENT as usize].words().get(pc as usize).copied()
    }

    /// The words currently in segment 0.
    pub fn program(&self) -> &[Word] {
        self.segments[PROGRAM_SEGMENT as usize].words()
    }

    pub fn len(&self, id: Word) -> Result<usize, VmError> {
        Ok(self.live(id)?.length)
    }

    pub fn capacity(&self, id: Word) -> Result<usize, VmError> {
        Ok(self.live(id)?.capacity())
    }

    pub fn is_mapped(&self, id: Word) -> bool {
        self.live(id).is_ok()
    }

    pub fn stats(&self) -> SegmentStats {
        self.stats
    }
}
