// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Integration tests for the hash-join engine across kind × strictness
//! combinations.

mod common;

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array};
use chunkjoin::{
    AsofInequality, Chunk, DictionaryLookup, DictionaryReader, HashJoin, JoinErrorKind, JoinKind,
    JoinResult, JoinStrictness, OverflowMode, SizeLimits,
};

use crate::common::*;

#[test]
fn inner_all_emits_every_match() {
    let right = chunk_of(vec![("k", int64(&[1, 2, 2])), ("v", utf8(&["a", "b", "c"]))]);
    let join = build_join(
        descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[2, 3])), ("u", int64(&[10, 20]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(2), Some(2)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(10), Some(10)]);
    assert_eq!(
        utf8_values(&out, "v"),
        vec![Some("b".to_string()), Some("c".to_string())]
    );
}

#[test]
fn left_any_defaults_unmatched_rows() {
    let right = chunk_of(vec![("k", int64(&[1, 1])), ("v", utf8(&["x", "y"]))]);
    let join = build_join(
        descriptor(JoinKind::Left, JoinStrictness::Any, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[1, 2])), ("u", int64(&[10, 20]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(1), Some(2)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(10), Some(20)]);
    // any_take_last_row is off: the first build row wins; the unmatched left
    // row gets a NULL-padded right side.
    assert_eq!(utf8_values(&out, "v"), vec![Some("x".to_string()), None]);
}

#[test]
fn left_any_take_last_row_overwrites() {
    let right = chunk_of(vec![("k", int64(&[1, 1])), ("v", utf8(&["x", "y"]))]);
    let join = build_join_with(
        descriptor(JoinKind::Left, JoinStrictness::Any, &["k"], &["k"]),
        &[right],
        true,
    );
    let left = chunk_of(vec![("k", int64(&[1]))]);
    let out = probe(&join, &left);
    assert_eq!(utf8_values(&out, "v"), vec![Some("y".to_string())]);
}

#[test]
fn right_all_null_key_surfaces_in_non_joined_scan() {
    let right = chunk_of(vec![
        ("k", int64_opt(&[Some(1), None])),
        ("v", utf8(&["a", "b"])),
    ]);
    let join = build_join(
        descriptor(JoinKind::Right, JoinStrictness::All, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[1, 2]))]);
    let out = probe(&join, &left);

    // RIGHT join: the unmatched left row is dropped at probe time.
    assert_eq!(int64_values(&out, "k"), vec![Some(1)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("a".to_string())]);

    let result_sample = out.schema();
    let mut reader = join
        .get_non_joined_blocks(&result_sample, 1024)
        .expect("right join has non-joined output");
    let scanned = reader.read().expect("scan").expect("one chunk");
    assert_eq!(int64_values(&scanned, "k"), vec![None]);
    assert_eq!(utf8_values(&scanned, "v"), vec![Some("b".to_string())]);
    assert!(reader.read().expect("scan").is_none());
}

#[test]
fn anti_left_emits_only_unmatched_rows() {
    let right = chunk_of(vec![("k", int64(&[1, 2]))]);
    let join = build_join(
        descriptor(JoinKind::Left, JoinStrictness::Anti, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[2, 3])), ("u", int64(&[20, 30]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(3)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(30)]);
}

#[test]
fn semi_left_emits_once_per_matching_row() {
    let right = chunk_of(vec![("k", int64(&[1, 1])), ("v", utf8(&["x", "y"]))]);
    let join = build_join(
        descriptor(JoinKind::Left, JoinStrictness::Semi, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[1, 2])), ("u", int64(&[10, 20]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(1)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(10)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("x".to_string())]);
}

#[test]
fn inner_any_emits_each_build_entry_once() {
    let right = chunk_of(vec![("k", int64(&[2])), ("v", utf8(&["a"]))]);
    let join = build_join(
        descriptor(JoinKind::Inner, JoinStrictness::Any, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[2, 2])), ("u", int64(&[10, 20]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(2)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(10)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("a".to_string())]);
}

#[test]
fn asof_left_nearest_under_less_or_equals() {
    let right = chunk_of(vec![
        ("k", utf8(&["x", "x", "x"])),
        ("t", int64(&[10, 20, 30])),
        ("v", utf8(&["A", "B", "C"])),
    ]);
    let mut descriptor = descriptor(
        JoinKind::Left,
        JoinStrictness::Asof,
        &["k", "t"],
        &["k", "t"],
    );
    descriptor.asof_inequality = AsofInequality::LessOrEquals;
    let join = build_join(descriptor, &[right]);
    let left = chunk_of(vec![
        ("k", utf8(&["x", "x", "x", "x"])),
        ("t", int64(&[5, 10, 25, 40])),
    ]);
    let out = probe(&join, &left);

    assert_eq!(
        utf8_values(&out, "v"),
        vec![
            None,
            Some("A".to_string()),
            Some("B".to_string()),
            Some("C".to_string())
        ]
    );
    // The right asof key column is appended after the added columns.
    assert_eq!(
        int64_values_at(&out, out.columns().len() - 1),
        vec![None, Some(10), Some(20), Some(30)]
    );
}

#[test]
fn asof_left_nearest_under_greater() {
    let right = chunk_of(vec![
        ("k", utf8(&["x", "x", "x"])),
        ("t", int64(&[10, 20, 30])),
        ("v", utf8(&["A", "B", "C"])),
    ]);
    let mut descriptor = descriptor(
        JoinKind::Left,
        JoinStrictness::Asof,
        &["k", "t"],
        &["k", "t"],
    );
    descriptor.asof_inequality = AsofInequality::Greater;
    let join = build_join(descriptor, &[right]);
    let left = chunk_of(vec![
        ("k", utf8(&["x", "x", "x", "x"])),
        ("t", int64(&[5, 10, 25, 40])),
    ]);
    let out = probe(&join, &left);

    assert_eq!(
        utf8_values(&out, "v"),
        vec![
            Some("A".to_string()),
            Some("B".to_string()),
            Some("C".to_string()),
            None
        ]
    );
}

#[test]
fn cross_join_resumes_through_continuation() {
    let right_one = chunk_of(vec![("b", int64(&[10, 11, 12, 13]))]);
    let right_two = chunk_of(vec![("b", int64(&[20, 21, 22]))]);
    let mut descriptor = descriptor(JoinKind::Cross, JoinStrictness::All, &[], &[]);
    descriptor.max_joined_block_rows = 5;
    let join = build_join(descriptor, &[right_one, right_two]);

    let left = chunk_of(vec![("a", int64(&[1, 2, 3]))]);
    let mut block = left;
    let mut not_processed = None;
    let mut a_values = Vec::new();
    let mut b_values = Vec::new();
    let mut chunks = 0;
    loop {
        join.join_block(&mut block, &mut not_processed)
            .expect("cross join");
        chunks += 1;
        a_values.extend(int64_values(&block, "a"));
        b_values.extend(int64_values(&block, "b"));
        if not_processed.is_none() {
            break;
        }
        assert!(chunks < 16, "cross join continuation must terminate");
        block = Chunk::default();
    }

    let mut expected_a = Vec::new();
    let mut expected_b = Vec::new();
    for a in [1i64, 2, 3] {
        for b in [10i64, 11, 12, 13, 20, 21, 22] {
            expected_a.push(Some(a));
            expected_b.push(Some(b));
        }
    }
    // Left-row-major, then right-block-major, then right-row-major order.
    assert_eq!(a_values, expected_a);
    assert_eq!(b_values, expected_b);
    assert!(chunks > 1, "five-row cap must split a 21-row product");
}

#[test]
fn required_right_keys_are_echoed_and_blanked() {
    let right = chunk_of(vec![("k", int64(&[1])), ("v", utf8(&["a"]))]);
    let mut descriptor = descriptor(JoinKind::Left, JoinStrictness::All, &["kl"], &["k"]);
    descriptor.required_right_keys = vec!["k".to_string()];
    let join = build_join(descriptor, &[right]);
    let left = chunk_of(vec![("kl", int64(&[1, 2])), ("u", int64(&[10, 20]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "kl"), vec![Some(1), Some(2)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("a".to_string()), None]);
    assert_eq!(int64_values(&out, "k"), vec![Some(1), None]);
}

#[test]
fn right_condition_mask_diverts_rows_to_scan() {
    let right = chunk_of(vec![
        ("k", int64(&[1, 2])),
        ("v", utf8(&["a", "b"])),
        ("m", mask_u8(&[1, 0])),
    ]);
    let mut descriptor = descriptor(JoinKind::Right, JoinStrictness::All, &["k"], &["k"]);
    descriptor.condition_column_right = Some("m".to_string());
    let join = build_join(descriptor, &[right]);
    let left = chunk_of(vec![("k", int64(&[1, 2]))]);
    let out = probe(&join, &left);

    // Row k=2 fails the ON mask: never inserted, not probe-joinable.
    assert_eq!(int64_values(&out, "k"), vec![Some(1)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("a".to_string())]);

    let result_sample = out.schema();
    let mut reader = join
        .get_non_joined_blocks(&result_sample, 1024)
        .expect("reader");
    let scanned = reader.read().expect("scan").expect("one chunk");
    assert_eq!(int64_values(&scanned, "k"), vec![Some(2)]);
    assert_eq!(utf8_values(&scanned, "v"), vec![Some("b".to_string())]);
    assert!(reader.read().expect("scan").is_none());
}

#[test]
fn left_condition_mask_rejects_probe_rows() {
    let right = chunk_of(vec![("k", int64(&[1])), ("v", utf8(&["a"]))]);
    let mut descriptor = descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]);
    descriptor.condition_column_left = Some("m".to_string());
    let join = build_join(descriptor, &[right]);
    let left = chunk_of(vec![("k", int64(&[1, 1])), ("m", mask_u8(&[1, 0]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(1)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("a".to_string())]);
}

#[test]
fn anti_right_output_comes_from_the_scan() {
    let right = chunk_of(vec![("k", int64(&[1, 2])), ("v", utf8(&["a", "b"]))]);
    let join = build_join(
        descriptor(JoinKind::Right, JoinStrictness::Anti, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[1]))]);
    let out = probe(&join, &left);
    assert_eq!(out.len(), 0, "anti right probe emits nothing");

    let result_sample = out.schema();
    let mut reader = join
        .get_non_joined_blocks(&result_sample, 1024)
        .expect("reader");
    let scanned = reader.read().expect("scan").expect("one chunk");
    assert_eq!(int64_values(&scanned, "k"), vec![Some(2)]);
    assert_eq!(utf8_values(&scanned, "v"), vec![Some("b".to_string())]);
}

#[test]
fn full_all_combines_probe_and_scan_output() {
    let right = chunk_of(vec![
        ("k", int64_opt(&[Some(1), None])),
        ("v", utf8(&["a", "b"])),
    ]);
    let join = build_join(
        descriptor(JoinKind::Full, JoinStrictness::All, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[1, 3])), ("u", int64(&[10, 30]))]);
    let out = probe(&join, &left);

    assert_eq!(int64_values(&out, "k"), vec![Some(1), Some(3)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(10), Some(30)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("a".to_string()), None]);

    let result_sample = out.schema();
    let mut reader = join
        .get_non_joined_blocks(&result_sample, 1024)
        .expect("reader");
    let scanned = reader.read().expect("scan").expect("one chunk");
    assert_eq!(int64_values(&scanned, "k"), vec![None]);
    assert_eq!(int64_values(&scanned, "u"), vec![None]);
    assert_eq!(utf8_values(&scanned, "v"), vec![Some("b".to_string())]);
}

#[test]
fn right_any_uses_first_build_row_and_scans_the_rest() {
    let right = chunk_of(vec![("k", int64(&[1, 2])), ("v", utf8(&["x", "y"]))]);
    let join = build_join(
        descriptor(JoinKind::Right, JoinStrictness::RightAny, &["k"], &["k"]),
        &[right],
    );
    let left = chunk_of(vec![("k", int64(&[1]))]);
    let out = probe(&join, &left);
    assert_eq!(int64_values(&out, "k"), vec![Some(1)]);
    assert_eq!(utf8_values(&out, "v"), vec![Some("x".to_string())]);

    let result_sample = out.schema();
    let mut reader = join
        .get_non_joined_blocks(&result_sample, 1024)
        .expect("reader");
    let scanned = reader.read().expect("scan").expect("one chunk");
    assert_eq!(int64_values(&scanned, "k"), vec![Some(2)]);
    assert_eq!(utf8_values(&scanned, "v"), vec![Some("y".to_string())]);
}

#[test]
fn serialized_fallback_handles_mixed_keys() {
    let right = chunk_of(vec![
        ("k1", utf8(&["x", "x", "y"])),
        ("k2", int64(&[1, 2, 1])),
        ("v", utf8(&["a", "b", "c"])),
    ]);
    let join = build_join(
        descriptor(
            JoinKind::Inner,
            JoinStrictness::All,
            &["k1", "k2"],
            &["k1", "k2"],
        ),
        &[right],
    );
    let left = chunk_of(vec![
        ("k1", utf8(&["x", "y", "y"])),
        ("k2", int64(&[2, 1, 9])),
    ]);
    let out = probe(&join, &left);

    assert_eq!(
        utf8_values(&out, "v"),
        vec![Some("b".to_string()), Some("c".to_string())]
    );
}

#[test]
fn packed_keys_join_on_two_integers() {
    let right = chunk_of(vec![
        ("k1", int64(&[1, 1])),
        ("k2", int64(&[10, 20])),
        ("v", utf8(&["a", "b"])),
    ]);
    let join = build_join(
        descriptor(
            JoinKind::Left,
            JoinStrictness::Any,
            &["k1", "k2"],
            &["k1", "k2"],
        ),
        &[right],
    );
    let left = chunk_of(vec![("k1", int64(&[1, 1])), ("k2", int64(&[20, 30]))]);
    let out = probe(&join, &left);

    assert_eq!(utf8_values(&out, "v"), vec![Some("b".to_string()), None]);
}

#[test]
fn size_limits_break_and_throw() {
    let right = chunk_of(vec![("k", int64(&[1, 2, 3])), ("v", utf8(&["a", "b", "c"]))]);
    let mut break_descriptor = descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]);
    break_descriptor.size_limits = SizeLimits {
        max_rows: 2,
        max_bytes: 0,
        overflow_mode: OverflowMode::Break,
    };
    let mut join =
        HashJoin::try_new(Arc::new(break_descriptor), &right, false).expect("join engine");
    assert!(!join.add_block(&right, true).expect("break mode returns false"));

    let mut throw_descriptor = descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]);
    throw_descriptor.size_limits = SizeLimits {
        max_rows: 2,
        max_bytes: 0,
        overflow_mode: OverflowMode::Throw,
    };
    let mut join =
        HashJoin::try_new(Arc::new(throw_descriptor), &right, false).expect("join engine");
    let err = join.add_block(&right, true).expect_err("throw mode");
    assert_eq!(err.kind, JoinErrorKind::SetSizeLimitExceeded);

    // Limits can be skipped per block.
    let mut skip_descriptor = descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]);
    skip_descriptor.size_limits = SizeLimits {
        max_rows: 2,
        max_bytes: 0,
        overflow_mode: OverflowMode::Throw,
    };
    let mut join =
        HashJoin::try_new(Arc::new(skip_descriptor), &right, false).expect("join engine");
    assert!(join.add_block(&right, false).expect("unchecked add"));
}

#[test]
fn join_get_point_lookup_and_checks() {
    let right = chunk_of(vec![("k", int64(&[1, 2])), ("v", utf8(&["a", "b"]))]);
    let mut storage_descriptor = descriptor(JoinKind::Left, JoinStrictness::Any, &["k"], &["k"]);
    storage_descriptor.storage_join = true;
    let join = build_join(storage_descriptor, &[right.clone()]);

    let keys = chunk_of(vec![("key", int64(&[2, 3]))]);
    let column = join.join_get(&keys, "v", false).expect("join_get");
    let chunk = chunk_of(vec![("v", column)]);
    assert_eq!(
        utf8_values(&chunk, "v"),
        vec![Some("b".to_string()), None]
    );

    let err = join.join_get(&keys, "missing", false).expect_err("column");
    assert_eq!(err.kind, JoinErrorKind::NoSuchColumnInTable);

    let two_keys = chunk_of(vec![("a", int64(&[1])), ("b", int64(&[2]))]);
    let err = join.join_get(&two_keys, "v", false).expect_err("arity");
    assert_eq!(err.kind, JoinErrorKind::NumberOfArgumentsDoesntMatch);

    let string_keys = chunk_of(vec![("key", utf8(&["1"]))]);
    let err = join.join_get(&string_keys, "v", false).expect_err("types");
    assert_eq!(err.kind, JoinErrorKind::TypeMismatch);

    let (data_type, nullable) = join
        .join_get_return_type(&[arrow::datatypes::DataType::Int64], "v", true)
        .expect("return type");
    assert_eq!(data_type, arrow::datatypes::DataType::Utf8);
    assert!(nullable);

    let inner = build_join(
        descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]),
        &[right],
    );
    let err = inner.join_get(&keys, "v", false).expect_err("kind");
    assert_eq!(err.kind, JoinErrorKind::IncompatibleTypeOfJoin);
}

#[test]
fn probe_key_type_mismatch_is_rejected() {
    let right = chunk_of(vec![("k", int64(&[1])), ("v", utf8(&["a"]))]);
    let join = build_join(
        descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]),
        &[right],
    );
    let mut left = chunk_of(vec![("k", utf8(&["1"]))]);
    let mut not_processed = None;
    let err = join
        .join_block(&mut left, &mut not_processed)
        .expect_err("type mismatch");
    assert_eq!(err.kind, JoinErrorKind::TypeMismatch);
}

#[test]
fn storage_reuse_yields_identical_results_and_locks_the_builder() {
    let right = chunk_of(vec![("k", int64(&[1, 2])), ("v", utf8(&["a", "b"]))]);
    let mut first_descriptor = descriptor(JoinKind::Left, JoinStrictness::Any, &["k"], &["k"]);
    first_descriptor.storage_join = true;
    let mut first = HashJoin::try_new(Arc::new(first_descriptor), &right, false).expect("join");
    assert!(first.add_block(&right, true).expect("add"));

    let mut second_descriptor = descriptor(JoinKind::Left, JoinStrictness::Any, &["k"], &["k"]);
    second_descriptor.storage_join = true;
    let mut second =
        HashJoin::try_new(Arc::new(second_descriptor), &right, false).expect("join");
    second.reuse_joined_data(&first);

    let left = chunk_of(vec![("k", int64(&[1, 3])), ("u", int64(&[5, 6]))]);
    let out_first = probe(&first, &left);
    let out_second = probe(&second, &left);
    assert_eq!(utf8_values(&out_first, "v"), utf8_values(&out_second, "v"));
    assert_eq!(
        int64_values(&out_first, "u"),
        int64_values(&out_second, "u")
    );

    // The shared data is locked against further builds.
    let err = first.add_block(&right, true).expect_err("shared data");
    assert_eq!(err.kind, JoinErrorKind::Logic);
}

#[test]
fn concurrent_probes_share_used_flags() {
    let right = chunk_of(vec![("k", int64(&[1, 2, 3])), ("v", utf8(&["a", "b", "c"]))]);
    let join = build_join(
        descriptor(JoinKind::Right, JoinStrictness::Any, &["k"], &["k"]),
        &[right],
    );
    join.set_probe_lock();

    let left = chunk_of(vec![("k", int64(&[1, 2, 3]))]);
    let total_rows = std::thread::scope(|scope| {
        let mut workers = Vec::new();
        for _ in 0..4 {
            let join = &join;
            let left = left.clone();
            workers.push(scope.spawn(move || probe(join, &left).len()));
        }
        workers
            .into_iter()
            .map(|worker| worker.join().expect("probe worker"))
            .sum::<usize>()
    });
    // Each build entry is claimed by exactly one prober.
    assert_eq!(total_rows, 3);

    let result_sample = chunk_of(vec![("k", int64(&[])), ("v", utf8(&[]))]).schema();
    let mut reader = join
        .get_non_joined_blocks(&result_sample, 1024)
        .expect("reader");
    assert!(reader.read().expect("scan").is_none(), "all rows consumed");
}

#[test]
fn empty_build_side_behaviour() {
    let sample = chunk_of(vec![("k", int64(&[])), ("v", utf8(&[]))]);
    let left_join = build_join_with(
        descriptor(JoinKind::Left, JoinStrictness::All, &["k"], &["k"]),
        &[sample.clone()],
        false,
    );
    assert!(left_join.empty());
    assert!(!left_join.always_returns_empty_set());
    let left = chunk_of(vec![("k", int64(&[1])), ("u", int64(&[7]))]);
    let out = probe(&left_join, &left);
    assert_eq!(int64_values(&out, "k"), vec![Some(1)]);
    assert_eq!(utf8_values(&out, "v"), vec![None]);

    let inner_join = build_join_with(
        descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]),
        &[sample],
        false,
    );
    assert!(inner_join.always_returns_empty_set());
    let out = probe(&inner_join, &left);
    assert_eq!(out.len(), 0);
}

#[test]
fn add_block_is_rejected_after_probe_lock() {
    let right = chunk_of(vec![("k", int64(&[1])), ("v", utf8(&["a"]))]);
    let mut join = build_join(
        descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]),
        &[right.clone()],
    );
    join.set_probe_lock();
    let err = join.add_block(&right, true).expect_err("locked");
    assert_eq!(err.kind, JoinErrorKind::Logic);
}

#[test]
fn any_full_is_rejected_at_configuration() {
    let right = chunk_of(vec![("k", int64(&[1]))]);
    let err = HashJoin::try_new(
        Arc::new(descriptor(JoinKind::Full, JoinStrictness::Any, &["k"], &["k"])),
        &right,
        false,
    )
    .expect_err("undefined combination");
    assert_eq!(err.kind, JoinErrorKind::NotImplemented);
}

#[test]
fn asof_configuration_errors() {
    let right = chunk_of(vec![("k", utf8(&["x"])), ("t", int64(&[1]))]);
    let mut right_asof = descriptor(
        JoinKind::Right,
        JoinStrictness::Asof,
        &["k", "t"],
        &["k", "t"],
    );
    right_asof.asof_inequality = AsofInequality::LessOrEquals;
    let err = HashJoin::try_new(Arc::new(right_asof), &right, false).expect_err("kind");
    assert_eq!(err.kind, JoinErrorKind::NotImplemented);

    let single_key = descriptor(JoinKind::Left, JoinStrictness::Asof, &["t"], &["t"]);
    let right = chunk_of(vec![("t", int64(&[1]))]);
    let err = HashJoin::try_new(Arc::new(single_key), &right, false).expect_err("keys");
    assert_eq!(err.kind, JoinErrorKind::Syntax);

    let nullable_asof = descriptor(
        JoinKind::Left,
        JoinStrictness::Asof,
        &["k", "t"],
        &["k", "t"],
    );
    let right = chunk_of(vec![("k", utf8(&["x"])), ("t", int64_opt(&[None]))]);
    let err = HashJoin::try_new(Arc::new(nullable_asof), &right, false).expect_err("nullable");
    assert_eq!(err.kind, JoinErrorKind::NotImplemented);
}

struct MapDictionary {
    keys: Vec<i64>,
    values: Vec<&'static str>,
}

impl DictionaryReader for MapDictionary {
    fn read_keys(&self, keys: &ArrayRef) -> JoinResult<DictionaryLookup> {
        let keys = keys
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| chunkjoin::JoinError::logic("dictionary expects Int64 keys"))?;
        let mut found = Vec::with_capacity(keys.len());
        let mut positions = Vec::with_capacity(keys.len());
        for row in 0..keys.len() {
            let position = (!keys.is_null(row))
                .then(|| self.keys.iter().position(|key| *key == keys.value(row)))
                .flatten();
            found.push(position.is_some());
            positions.push(position.unwrap_or(0) as u32);
        }
        Ok(DictionaryLookup {
            chunk: chunk_of(vec![("v", utf8(&self.values))]),
            found,
            positions,
        })
    }
}

#[test]
fn dictionary_join_probes_through_the_reader() {
    let sample = chunk_of(vec![("k", int64(&[])), ("v", utf8(&[]))]);
    let mut dict_descriptor = descriptor(JoinKind::Left, JoinStrictness::Any, &["k"], &["k"]);
    dict_descriptor.dictionary_reader = Some(Arc::new(MapDictionary {
        keys: vec![1, 2],
        values: vec!["one", "two"],
    }));
    let join = HashJoin::try_new(Arc::new(dict_descriptor), &sample, false).expect("join");
    assert!(join.over_dictionary());

    let right = chunk_of(vec![("k", int64(&[9])), ("v", utf8(&["z"]))]);
    let mut builder = join;
    let err = builder.add_block(&right, true).expect_err("dict build");
    assert_eq!(err.kind, JoinErrorKind::Logic);
    let join = builder;

    let left = chunk_of(vec![("k", int64(&[1, 3])), ("u", int64(&[10, 30]))]);
    let out = probe(&join, &left);
    assert_eq!(int64_values(&out, "k"), vec![Some(1), Some(3)]);
    assert_eq!(int64_values(&out, "u"), vec![Some(10), Some(30)]);
    assert_eq!(
        utf8_values(&out, "v"),
        vec![Some("one".to_string()), None]
    );
}

#[test]
fn total_counts_grow_with_build_input() {
    let right = chunk_of(vec![("k", int64(&[1, 2, 2])), ("v", utf8(&["a", "b", "c"]))]);
    let join = build_join(
        descriptor(JoinKind::Inner, JoinStrictness::All, &["k"], &["k"]),
        &[right],
    );
    assert_eq!(join.get_total_row_count(), 3);
    assert!(join.get_total_byte_count() > 0);
    assert!(join.mem_tracker().current() > 0);
}
