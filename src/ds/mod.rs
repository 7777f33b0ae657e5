pub mod hint_table;
pub mod index_slot;
pub mod window;

pub use hint_table::{DEFAULT_HINT_CAPACITY, HintTable};
pub use index_slot::{CacheIndex, CoreId, IndexSlot};
pub use window::{DuplicateKeyPolicy, EntryWindow, InsertOutcome};
