use mimalloc::MiMalloc;

pub mod common;
pub mod io;
pub mod options;
pub mod pages;
pub mod parquet_source;
pub mod predicate;
pub mod projection;
pub mod scanner;
pub mod schema;
pub mod section;
pub mod selection;
pub mod series;
pub mod writer;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
