//! Core value types for the piece kernel.

pub mod path;
pub mod position;
pub mod item;
pub mod value;
pub mod changeset;
pub mod id;

pub use path::{FieldAlias, Path, PathParseError, Step};
pub use position::{Duration, Position, PositionError, Ratio};
pub use item::{Item, ItemTag, Pitch, Rest, Chord, Marker, MarkerKind};
pub use value::Value;
pub use changeset::{ChangeSet, ChangeSetError};
pub use id::{DocumentId, ElementId, IdAllocator};
