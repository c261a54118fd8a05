mod live_turn_tests;
mod registry_tests;
mod session_tests;
