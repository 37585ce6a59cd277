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
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinErrorKind {
    /// Invariant violated: uninitialized engine, write while locked,
    /// unreachable dispatch.
    Logic,
    NotImplemented,
    Syntax,
    TypeMismatch,
    NoSuchColumnInTable,
    IncompatibleTypeOfJoin,
    UnsupportedJoinKeys,
    NumberOfArgumentsDoesntMatch,
    /// Build exceeded configured row/byte limits. The only kind convertible
    /// to a boolean `add_block` result.
    SetSizeLimitExceeded,
}

impl JoinErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logic => "LOGIC_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::Syntax => "SYNTAX_ERROR",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::NoSuchColumnInTable => "NO_SUCH_COLUMN_IN_TABLE",
            Self::IncompatibleTypeOfJoin => "INCOMPATIBLE_TYPE_OF_JOIN",
            Self::UnsupportedJoinKeys => "UNSUPPORTED_JOIN_KEYS",
            Self::NumberOfArgumentsDoesntMatch => "NUMBER_OF_ARGUMENTS_DOESNT_MATCH",
            Self::SetSizeLimitExceeded => "SET_SIZE_LIMIT_EXCEEDED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinError {
    pub kind: JoinErrorKind,
    pub message: String,
}

impl JoinError {
    pub fn new(kind: JoinErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn logic(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::Logic, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::NotImplemented, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::Syntax, message)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::TypeMismatch, message)
    }

    pub fn no_such_column(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::NoSuchColumnInTable, message)
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::IncompatibleTypeOfJoin, message)
    }

    pub fn unsupported_keys(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::UnsupportedJoinKeys, message)
    }

    pub fn arguments_mismatch(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::NumberOfArgumentsDoesntMatch, message)
    }

    pub fn size_limit(message: impl Into<String>) -> Self {
        Self::new(JoinErrorKind::SetSizeLimitExceeded, message)
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for JoinError {}

impl From<String> for JoinError {
    fn from(message: String) -> Self {
        JoinError::logic(message)
    }
}

pub type JoinResult<T> = Result<T, JoinError>;
