#![forbid(unsafe_code)]

pub mod boundary;
pub mod ids;
pub mod model;
pub mod seam;
pub mod splitter;

pub use ids::{NodeId, StoryId, slugify};
pub use model::{LengthMode, Node, Story};
