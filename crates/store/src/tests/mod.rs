mod helpers;
mod read_write_tests;
