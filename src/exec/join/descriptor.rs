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
use std::sync::Arc;

use crate::exec::join::asof::AsofInequality;
use crate::exec::join::dict::DictionaryReader;
use crate::exec::join::error::{JoinError, JoinResult};
use crate::exec::join::table::MapsKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Full => "FULL",
            Self::Cross => "CROSS",
        }
    }

    pub fn is_left_or_full(&self) -> bool {
        matches!(self, Self::Left | Self::Full)
    }

    pub fn is_right_or_full(&self) -> bool {
        matches!(self, Self::Right | Self::Full)
    }

    pub fn is_inner_or_right(&self) -> bool {
        matches!(self, Self::Inner | Self::Right)
    }
}

/// How many right matches to emit per left row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinStrictness {
    /// First match.
    Any,
    /// All matches.
    All,
    /// Existence.
    Semi,
    /// Absence.
    Anti,
    /// Nearest by the ordered asof column.
    Asof,
    /// Legacy ANY: first row seen during build, left columns replicated on
    /// the right side.
    RightAny,
}

impl JoinStrictness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::All => "ALL",
            Self::Semi => "SEMI",
            Self::Anti => "ANTI",
            Self::Asof => "ASOF",
            Self::RightAny => "RIGHT_ANY",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowMode {
    /// Exceeding the limit is an error.
    Throw,
    /// Exceeding the limit turns `add_block` into a false return.
    Break,
}

#[derive(Clone, Copy, Debug)]
pub struct SizeLimits {
    /// 0 means unlimited.
    pub max_rows: u64,
    /// 0 means unlimited.
    pub max_bytes: u64,
    pub overflow_mode: OverflowMode,
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self {
            max_rows: 0,
            max_bytes: 0,
            overflow_mode: OverflowMode::Throw,
        }
    }
}

impl SizeLimits {
    /// True when within limits; false for Break overflow; error for Throw.
    pub fn check(&self, rows: u64, bytes: u64, what: &str) -> JoinResult<bool> {
        let rows_exceeded = self.max_rows > 0 && rows > self.max_rows;
        let bytes_exceeded = self.max_bytes > 0 && bytes > self.max_bytes;
        if !rows_exceeded && !bytes_exceeded {
            return Ok(true);
        }
        match self.overflow_mode {
            OverflowMode::Break => Ok(false),
            OverflowMode::Throw => Err(JoinError::size_limit(format!(
                "{} size limit exceeded: rows={} max_rows={} bytes={} max_bytes={}",
                what, rows, self.max_rows, bytes, self.max_bytes
            ))),
        }
    }
}

/// Resolved join description: the narrow slice of the planner's table-join
/// descriptor the engine consumes.
pub struct JoinDescriptor {
    pub kind: JoinKind,
    pub strictness: JoinStrictness,
    pub key_names_left: Vec<String>,
    pub key_names_right: Vec<String>,
    pub asof_inequality: AsofInequality,
    /// Right-side key columns the caller wants echoed in the output even when
    /// they equal the left-side key.
    pub required_right_keys: Vec<String>,
    pub condition_column_left: Option<String>,
    pub condition_column_right: Option<String>,
    pub size_limits: SizeLimits,
    pub max_joined_block_rows: usize,
    pub force_nullable_left: bool,
    pub force_nullable_right: bool,
    /// Keep key columns in the stored chunks so the built data can back a
    /// storage join.
    pub storage_join: bool,
    pub dictionary_reader: Option<Arc<dyn DictionaryReader>>,
}

impl JoinDescriptor {
    pub fn new(
        kind: JoinKind,
        strictness: JoinStrictness,
        key_names_left: Vec<String>,
        key_names_right: Vec<String>,
    ) -> Self {
        Self {
            kind,
            strictness,
            key_names_left,
            key_names_right,
            asof_inequality: AsofInequality::GreaterOrEquals,
            required_right_keys: Vec::new(),
            condition_column_left: None,
            condition_column_right: None,
            size_limits: SizeLimits::default(),
            max_joined_block_rows: 65536,
            force_nullable_left: false,
            force_nullable_right: false,
            storage_join: false,
            dictionary_reader: None,
        }
    }

    /// Left key column feeding the given right key, by key position.
    pub fn left_name_for_right_key(&self, right_name: &str) -> Option<&str> {
        let index = self
            .key_names_right
            .iter()
            .position(|name| name == right_name)?;
        self.key_names_left.get(index).map(String::as_str)
    }
}

/// Payload shape for a (kind, strictness) combination.
pub(crate) fn maps_kind(kind: JoinKind, strictness: JoinStrictness) -> JoinResult<MapsKind> {
    let maps = match strictness {
        JoinStrictness::Asof => MapsKind::Asof,
        JoinStrictness::All => MapsKind::All,
        JoinStrictness::RightAny => MapsKind::One,
        JoinStrictness::Any => match kind {
            JoinKind::Left | JoinKind::Inner | JoinKind::Cross => MapsKind::One,
            JoinKind::Right => MapsKind::All,
            JoinKind::Full => {
                return Err(JoinError::not_implemented(
                    "ANY FULL join is not supported",
                ));
            }
        },
        JoinStrictness::Semi | JoinStrictness::Anti => match kind {
            JoinKind::Left => MapsKind::One,
            JoinKind::Right => MapsKind::All,
            other => {
                return Err(JoinError::not_implemented(format!(
                    "{} {} join is not supported",
                    other.as_str(),
                    strictness.as_str()
                )));
            }
        },
    };
    Ok(maps)
}

/// Whether the combination tracks used build rows: any combination that can
/// produce non-joined right output, plus ANY INNER which needs cross-thread
/// first-hit arbitration.
pub(crate) fn needs_used_flags(kind: JoinKind, strictness: JoinStrictness) -> bool {
    if strictness == JoinStrictness::Asof {
        return false;
    }
    kind.is_right_or_full() || (kind == JoinKind::Inner && strictness == JoinStrictness::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::join::error::JoinErrorKind;

    #[test]
    fn size_limit_modes() {
        let mut limits = SizeLimits {
            max_rows: 10,
            max_bytes: 0,
            overflow_mode: OverflowMode::Break,
        };
        assert!(limits.check(10, 0, "JOIN").expect("in limit"));
        assert!(!limits.check(11, 0, "JOIN").expect("break mode"));
        limits.overflow_mode = OverflowMode::Throw;
        let err = limits.check(11, 0, "JOIN").expect_err("throw mode");
        assert_eq!(err.kind, JoinErrorKind::SetSizeLimitExceeded);
    }

    #[test]
    fn payload_shapes_per_combination() {
        use JoinKind::*;
        use JoinStrictness::*;
        assert_eq!(maps_kind(Left, Any).expect("maps"), MapsKind::One);
        assert_eq!(maps_kind(Right, Any).expect("maps"), MapsKind::All);
        assert_eq!(maps_kind(Right, Semi).expect("maps"), MapsKind::All);
        assert_eq!(maps_kind(Left, Anti).expect("maps"), MapsKind::One);
        assert_eq!(maps_kind(Full, All).expect("maps"), MapsKind::All);
        assert_eq!(maps_kind(Full, RightAny).expect("maps"), MapsKind::One);
        assert_eq!(maps_kind(Inner, Asof).expect("maps"), MapsKind::Asof);
        assert_eq!(
            maps_kind(Full, Any).expect_err("rejected").kind,
            JoinErrorKind::NotImplemented
        );
        assert_eq!(
            maps_kind(Inner, Semi).expect_err("rejected").kind,
            JoinErrorKind::NotImplemented
        );
    }

    #[test]
    fn flagged_combinations() {
        use JoinKind::*;
        use JoinStrictness::*;
        assert!(needs_used_flags(Right, All));
        assert!(needs_used_flags(Full, RightAny));
        assert!(needs_used_flags(Inner, Any));
        assert!(!needs_used_flags(Left, Any));
        assert!(!needs_used_flags(Inner, All));
        assert!(!needs_used_flags(Left, Asof));
    }
}
