mod helpers;

mod counter_tests;
mod expire_tests;
