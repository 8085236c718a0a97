//! Move detection and effective-diff reduction over realistic diffs.

use prlens_core::{parse_diff, MoveConfig, MoveDetector};

/// A four-line block deleted from util.rs and re-added verbatim in helpers.rs.
const PURE_MOVE: &str = "\
diff --git a/src/util.rs b/src/util.rs
--- a/src/util.rs
+++ b/src/util.rs
@@ -5,6 +5,2 @@
 fn keep_me() {}
-fn normalize(input: &str) -> String {
-    let trimmed = input.trim();
-    trimmed.to_lowercase()
-}
 fn also_keep() {}
diff --git a/src/helpers.rs b/src/helpers.rs
--- a/src/helpers.rs
+++ b/src/helpers.rs
@@ -20,2 +20,6 @@
 fn existing() {}
+fn normalize(input: &str) -> String {
+    let trimmed = input.trim();
+    trimmed.to_lowercase()
+}
 fn tail() {}
";

/// Same shape of move, but one line edited in flight.
const EDITED_MOVE: &str = "\
diff --git a/src/util.rs b/src/util.rs
--- a/src/util.rs
+++ b/src/util.rs
@@ -5,8 +5,2 @@
 fn keep_me() {}
-fn normalize(input: &str) -> String {
-    let trimmed = input.trim();
-    let lowered = trimmed.to_lowercase();
-    let squeezed = lowered.replace('\\t', \" \");
-    squeezed
-}
 fn also_keep() {}
diff --git a/src/helpers.rs b/src/helpers.rs
--- a/src/helpers.rs
+++ b/src/helpers.rs
@@ -20,2 +20,8 @@
 fn existing() {}
+fn normalize(input: &str) -> String {
+    let trimmed = input.trim();
+    let lowered = trimmed.to_lowercase();
+    let squeezed = lowered.replace('\\t', \" \");
+    squeezed.trim_end().to_owned()
+}
 fn tail() {}
";

#[test]
fn cross_file_move_is_detected() {
    let full = parse_diff(PURE_MOVE, None);
    let report = MoveDetector::default().detect(&full);

    assert_eq!(report.moves_detected, 1);
    let mv = &report.moves[0];
    assert_eq!(mv.source_file, "src/util.rs");
    assert_eq!(mv.target_file, "src/helpers.rs");
    assert_eq!(mv.matched_lines, 4);
    assert_eq!(mv.source_lines, (6, 9));
    assert_eq!(mv.target_lines, (21, 24));
    assert!((mv.score - 1.0).abs() < f64::EPSILON);
}

#[test]
fn totals_never_double_subtract() {
    let full = parse_diff(PURE_MOVE, None);
    let report = MoveDetector::default().detect(&full);

    assert_eq!(report.total_lines_moved, 4);
    assert_eq!(
        report.total_lines_moved + report.total_lines_effectively_changed,
        full.changed_line_count()
    );
}

#[test]
fn pure_move_vanishes_from_effective_diff() {
    let full = parse_diff(PURE_MOVE, None);
    let (effective, report) = MoveDetector::default().reduce(&full);

    assert_eq!(report.moves_detected, 1);
    assert!(effective.hunks.is_empty());
}

#[test]
fn edited_move_leaves_only_the_edit() {
    let full = parse_diff(EDITED_MOVE, None);
    let (effective, report) = MoveDetector::default().reduce(&full);

    // Four of six lines still match contiguously, over the 0.5 threshold.
    assert_eq!(report.moves_detected, 1);
    assert_eq!(report.moves[0].matched_lines, 4);

    // The residual re-diff covers the edited line, not the whole block.
    assert_eq!(effective.hunks.len(), 1);
    let residual = &effective.hunks[0];
    assert_eq!(residual.removed_lines().len(), 1);
    assert_eq!(residual.added_lines().len(), 1);
    let changed = residual.changed_content();
    assert!(changed.contains("squeezed"));
    assert!(changed.contains("trim_end().to_owned()"));
    assert!(!changed.contains("fn existing"));
}

#[test]
fn short_runs_are_never_proposed() {
    let raw = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,3 +1,1 @@
 fn stay() {}
-let x = 1;
-let y = 2;
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1,1 +1,3 @@
 fn other() {}
+let x = 1;
+let y = 2;
";
    let full = parse_diff(raw, None);
    let report = MoveDetector::default().detect(&full);
    assert_eq!(report.moves_detected, 0);

    // Lowering the minimum run length makes the same pair a move.
    let relaxed = MoveDetector::new(MoveConfig {
        min_run_len: 2,
        score_threshold: 0.5,
    });
    assert_eq!(relaxed.detect(&full).moves_detected, 1);
}

#[test]
fn consumed_runs_are_exclusive() {
    // One removed block, two identical added blocks: only one move.
    let raw = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,4 +1,1 @@
 fn stay() {}
-fn moved() {
-    body();
-}
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1,1 +1,4 @@
 fn one() {}
+fn moved() {
+    body();
+}
diff --git a/c.rs b/c.rs
--- a/c.rs
+++ b/c.rs
@@ -1,1 +1,4 @@
 fn two() {}
+fn moved() {
+    body();
+}
";
    let full = parse_diff(raw, None);
    let report = MoveDetector::default().detect(&full);
    assert_eq!(report.moves_detected, 1);
    assert_eq!(report.total_lines_moved, 3);
}

#[test]
fn tie_breaks_are_deterministic() {
    let raw = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,4 +1,1 @@
 fn stay() {}
-fn moved() {
-    body();
-}
diff --git a/b.rs b/b.rs
--- a/b.rs
+++ b/b.rs
@@ -1,1 +1,4 @@
 fn one() {}
+fn moved() {
+    body();
+}
diff --git a/c.rs b/c.rs
--- a/c.rs
+++ b/c.rs
@@ -1,1 +1,4 @@
 fn two() {}
+fn moved() {
+    body();
+}
";
    let full = parse_diff(raw, None);
    let detector = MoveDetector::default();
    let first = detector.detect(&full);
    for _ in 0..10 {
        assert_eq!(detector.detect(&full), first);
    }
    // Equal scores resolve by target path: b.rs wins over c.rs.
    assert_eq!(first.moves[0].target_file, "b.rs");
}

#[test]
fn degraded_target_header_survives_reduction() {
    // The parser keeps hunks with unreadable `@@` headers at position 0, so
    // an added run can start at line 0. Reduction must stay total over such
    // input instead of panicking while remapping the residual re-diff.
    let raw = "\
diff --git a/src/util.rs b/src/util.rs
--- a/src/util.rs
+++ b/src/util.rs
@@ -5,8 +5,2 @@
 fn keep_me() {}
-fn normalize(input: &str) -> String {
-    let trimmed = input.trim();
-    let lowered = trimmed.to_lowercase();
-    let squeezed = lowered.replace('\\t', \" \");
-    squeezed
-}
 fn also_keep() {}
diff --git a/src/helpers.rs b/src/helpers.rs
--- a/src/helpers.rs
+++ b/src/helpers.rs
@@ bogus @@
+fn normalize(input: &str) -> String {
+    let trimmed = input.trim();
+    let lowered = trimmed.to_lowercase();
+    let squeezed = lowered.replace('\\t', \" \");
+    squeezed.trim_end().to_owned()
+}
";
    let full = parse_diff(raw, None);
    let (effective, report) = MoveDetector::default().reduce(&full);

    assert_eq!(report.moves_detected, 1);
    assert_eq!(report.moves[0].matched_lines, 4);
    // The residual edit survives; the degraded positions stay degraded.
    assert_eq!(effective.hunks.len(), 1);
    assert!(effective.hunks[0].changed_content().contains("trim_end"));
}

#[test]
fn in_hunk_rewrites_are_not_moves() {
    let raw = "\
diff --git a/a.rs b/a.rs
--- a/a.rs
+++ b/a.rs
@@ -1,4 +1,4 @@
-fn moved() {
-    body();
-}
+fn moved() {
+    body();
+}
 fn stay() {}
";
    let full = parse_diff(raw, None);
    let report = MoveDetector::default().detect(&full);
    assert_eq!(report.moves_detected, 0);
}
