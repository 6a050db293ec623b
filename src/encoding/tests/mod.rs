mod tests_limits;
mod tests_option;
