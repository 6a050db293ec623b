mod helpers;

mod tests_reader;

// Range tombstones
mod tests_range_del;



// Introspection
mod tests_layout;
