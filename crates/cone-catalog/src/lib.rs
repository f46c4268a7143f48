mod catalog_index;

pub use catalog_index::Catalog;

#[cfg(test)]
mod tests;
