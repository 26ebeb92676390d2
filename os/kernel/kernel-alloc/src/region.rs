//! # Page Pool Selection
//!
//! Picks the physical range the bump allocator carves pages from:
//!
//! 1. Clip every memory-map range to whole pages.
//! 2. Keep ranges that start at or above the load boundary and end below the
//!    top boundary, and pick the largest (first one wins ties).
//! 3. Cut every loaded image out of the candidate. An image that starts inside
//!    keeps the part below it; one that starts at or before the candidate
//!    keeps the part above it.

use kernel_info::memory::{KERNEL_LOAD, PHYSMAP};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRegion, Size4K};
use log::debug;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("could not find a valid region in memory map for pages")]
    NoValidRegion,
    #[error("after shrinking region for headers, region is invalid")]
    EmptyAfterShrink,
}

/// Bounds a page pool must respect.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RegionConstraints {
    /// Lowest acceptable pool start.
    pub load_boundary: PhysicalAddress,
    /// The pool must end strictly below this address.
    pub top_boundary: PhysicalAddress,
}

impl Default for RegionConstraints {
    /// Above the loaded kernel, inside the kernel's physical window.
    fn default() -> Self {
        Self {
            load_boundary: PhysicalAddress::new(KERNEL_LOAD),
            top_boundary: PhysicalAddress::new(PHYSMAP),
        }
    }
}

/// Shrink `range` to the whole pages it contains.
fn whole_pages(range: PhysicalRegion) -> Option<PhysicalRegion> {
    let start = range.start.page_up::<Size4K>()?;
    let end = range.end.page_end_down::<Size4K>()?;
    Some(PhysicalRegion::new(start, end))
}

/// Compute the page pool from the memory map and the loaded-image ranges.
///
/// All ranges are inclusive. The returned region starts on a page boundary,
/// ends on the last byte of a page and holds at least one page.
///
/// # Errors
/// - [`RegionError::NoValidRegion`] if no memory-map range qualifies.
/// - [`RegionError::EmptyAfterShrink`] if the loaded images leave nothing.
pub fn select_region<M, H>(
    mmap: M,
    headers: H,
    constraints: RegionConstraints,
) -> Result<PhysicalRegion, RegionError>
where
    M: IntoIterator<Item = PhysicalRegion>,
    H: IntoIterator<Item = PhysicalRegion>,
{
    let mut best: Option<PhysicalRegion> = None;
    for range in mmap {
        let Some(clipped) = whole_pages(range) else {
            debug!("  {range}, no full pages");
            continue;
        };
        debug!("  {range}, full pages {clipped}");

        let qualifies = clipped.start >= constraints.load_boundary
            && clipped.end < constraints.top_boundary
            && clipped.start < clipped.end;
        if qualifies && best.is_none_or(|b| b.span() < clipped.span()) {
            best = Some(clipped);
        }
    }

    let Some(mut pool) = best else {
        return Err(RegionError::NoValidRegion);
    };
    debug!("Largest candidate {pool}");

    for header in headers {
        if !header.overlaps(&pool) {
            continue;
        }

        // Lower-part-first is intended: an interior image keeps the range below it.
        if header.start > pool.start {
            // Keep what lies below the image.
            pool.end = header
                .start
                .checked_sub(1)
                .and_then(PhysicalAddress::page_end_down::<Size4K>)
                .ok_or(RegionError::EmptyAfterShrink)?;
        } else if header.end < pool.end {
            // Keep what lies above the image.
            pool.start = header
                .end
                .checked_add(1)
                .and_then(PhysicalAddress::page_up::<Size4K>)
                .ok_or(RegionError::EmptyAfterShrink)?;
        } else {
            debug!("Image {header} covers the whole candidate");
            return Err(RegionError::EmptyAfterShrink);
        }
        debug!("Image {header} shrinks the candidate to {pool}");

        if !pool.is_page_pool() {
            return Err(RegionError::EmptyAfterShrink);
        }
    }

    if pool.start >= pool.end {
        return Err(RegionError::EmptyAfterShrink);
    }
    debug!("Page pool {pool}, {} pages", pool.pages());
    Ok(pool)
}
