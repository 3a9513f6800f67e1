/// Entity ids in the source system are 64-bit integers.
pub type SourceId = i64;

/// Entity ids in the target system are 64-bit integers.
pub type TargetId = i64;

/// Source timestamps are Unix seconds.
pub type UnixTime = i64;

/// Short, unique identifier of a target project (at most 10 chars).
pub type ProjectCode = String;
