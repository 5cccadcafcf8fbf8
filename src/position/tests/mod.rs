//! Cross-cutting position tests: random-walk properties and generator
//! consistency.

mod generators;
mod random_walk;
