// SPDX-FileCopyrightText: 2026 Harvester Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed message corpus for synthetic groups.

/// Job postings first, then ordinary chatter.
pub const MESSAGES: &[&str] = &[
    "We are hiring a Python developer for our startup in Bangalore. Contact: 9876543210",
    "Looking for React developer with 2+ years experience. Remote work available.",
    "Job opening for fresher software engineer. No experience required. Apply now!",
    "Hiring frontend developer with HTML, CSS, JavaScript skills. Mumbai location.",
    "Career opportunity for DevOps engineer. AWS experience preferred.",
    "Internship position available for computer science students. 6 months duration.",
    "Full-time position for backend developer. Node.js and MongoDB required.",
    "Part-time work from home opportunity. Flexible hours. Contact for details.",
    "Just sharing some random thoughts about technology trends",
    "Check out this cool article about AI and machine learning",
    "Anyone know good restaurants in the area?",
    "Weather is really nice today, perfect for a walk",
    "Happy birthday to everyone in the group!",
    "This group is getting too noisy with all the spam",
    "We need to moderate this group better",
];

/// Number of leading [`MESSAGES`] that are job postings.
pub const JOB_POSTINGS: usize = 8;
