//
// Copyright (c) 2024 Nathan Fiedler
//
pub mod criteria;
pub mod entities;
pub mod query;
