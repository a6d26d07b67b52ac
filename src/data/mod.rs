//
// Copyright (c) 2024 Nathan Fiedler
//
pub mod repositories;
pub mod sources;
