mod tests_internal_key;
