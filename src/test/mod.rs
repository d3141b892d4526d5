pub mod tfjs_tests;
