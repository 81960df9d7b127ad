//! Block storage for the strata world: material ids, palette-compressed
//! sections, and the narrow [`WorldGrid`] interface that decoration and
//! terrain integration write through.

mod bit_packed;
mod grid;
mod journal;
mod registry;
mod section;

pub use bit_packed::PackedIndices;
pub use grid::{DEFAULT_MAX_Y, DEFAULT_MIN_Y, GridError, VoxelWorld, WorldGrid};
pub use journal::{BlockChange, ChangeJournal};
pub use registry::{MaterialDef, MaterialId, MaterialRegistry, MaterialRegistryError};
pub use section::{SECTION_SIZE, SECTION_VOLUME, SectionData};
