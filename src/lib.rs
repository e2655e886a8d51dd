//! Empty crate root; exists only so the workspace root can own the
//! end-to-end tests in `tests/` that exercise every crate together.
