// ─── Launcher Core ───
// Resolution → authentication → download → launch pipeline.
//
// Architecture:
//   core/
//     platform    — Host facts (os, version, arch) detected once
//     rules       — allow/disallow rule evaluation
//     auth/       — Legacy, Microsoft and offline credentials + refresh broker
//     downloader/ — Concurrent downloads with hash validation and progress
//     maven/      — Coordinate parsing and repository paths
//     version/    — Manifest cache, descriptors, argument templates, merging
//     libraries/  — Classpath jars, natives and their extraction
//     assets/     — Asset index + content-addressed object store
//     java/       — Runtime lookup and probing
//     launch/     — Placeholder substitution, launch plan, process spawn
//     pipeline    — Drives the five stages of a launch attempt

pub mod assets;
pub mod auth;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod libraries;
pub mod maven;
pub mod pipeline;
pub mod platform;
pub mod rules;
pub mod version;

#[cfg(test)]
pub mod test_support;
