// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod dialog;
pub mod editor;
pub mod ids;
pub mod model;
pub mod reorder;
pub mod sync;
pub mod table;
pub mod validation;

pub use dialog::*;
pub use editor::*;
pub use ids::*;
pub use model::*;
pub use reorder::*;
pub use sync::*;
pub use table::*;
pub use validation::*;
