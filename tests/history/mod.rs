// Test module entry point for history tests
// Version log backends, the history store and restore


mod store_tests;
