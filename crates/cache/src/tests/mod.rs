mod clock_tests;
mod helpers;
mod tile_tests;
