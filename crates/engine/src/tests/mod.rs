mod helpers;

mod recovery_tests;
mod rotation_tests;
