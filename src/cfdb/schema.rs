pub const STUDENTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Students (
        id                     INTEGER     PRIMARY KEY,
        name                   TEXT        NOT NULL,
        email                  TEXT        NOT NULL    UNIQUE,
        handle                 TEXT        NOT NULL    UNIQUE,

        current_rating         INTEGER     NOT NULL    DEFAULT 0,
        max_rating             INTEGER     NOT NULL    DEFAULT 0,
        rank                   TEXT        NOT NULL    DEFAULT 'Unrated',
        avatar                 TEXT        NOT NULL    DEFAULT '',

        last_synced_at         INTEGER,
        last_submission_time   INTEGER,

        reminder_count         INTEGER     NOT NULL    DEFAULT 0,
        notifications_enabled  BOOLEAN     NOT NULL    DEFAULT 1
    )";

pub const CONTESTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Contests (
        student_id             INTEGER     NOT NULL    REFERENCES Students(id),
        contest_id             INTEGER     NOT NULL,
        contest_name           TEXT        NOT NULL,

        rank                   INTEGER     NOT NULL,
        old_rating             INTEGER     NOT NULL,
        new_rating             INTEGER     NOT NULL,
        rating_change          INTEGER     NOT NULL,
        update_time_seconds    INTEGER     NOT NULL,

        UNIQUE (student_id, contest_id)
    )";

pub const SUBMISSIONS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Submissions (
        submission_id          INTEGER     PRIMARY KEY,
        student_id             INTEGER     NOT NULL    REFERENCES Students(id),
        contest_id             INTEGER     NOT NULL    DEFAULT 0,

        problem_name           TEXT,
        problem_index          TEXT,
        problem_rating         INTEGER,
        tags                   TEXT        NOT NULL    DEFAULT '[]',

        author                 TEXT        NOT NULL    DEFAULT 'Unknown',
        language               TEXT        NOT NULL,
        verdict                TEXT,
        testset                TEXT        NOT NULL    DEFAULT 'TESTS',
        passed_test_count      INTEGER     NOT NULL    DEFAULT 0,
        time_consumed_millis   INTEGER     NOT NULL    DEFAULT 0,
        memory_consumed_bytes  INTEGER     NOT NULL    DEFAULT 0,
        creation_time_seconds  INTEGER     NOT NULL
    )";

pub const SOLVED_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS SolvedProblems (
        student_id             INTEGER     NOT NULL    REFERENCES Students(id),
        problem_name           TEXT        NOT NULL,
        problem_rating         INTEGER     NOT NULL    DEFAULT 0,
        tags                   TEXT        NOT NULL    DEFAULT '[]',
        solved_at              INTEGER     NOT NULL,
        language               TEXT        NOT NULL,
        verdict                TEXT        NOT NULL,

        UNIQUE (student_id, problem_name)
    )";

pub const SETTINGS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Settings (
        key                    TEXT        PRIMARY KEY,
        value                  TEXT        NOT NULL,
        description            TEXT        NOT NULL    DEFAULT ''
    )";

pub const SUBMISSIONS_BY_STUDENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_submissions_student
     ON Submissions (student_id, creation_time_seconds DESC)";

pub const SOLVED_BY_STUDENT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_solved_student
     ON SolvedProblems (student_id, solved_at DESC)";

pub const ALL: &[&str] = &[
    STUDENTS_SCHEMA,
    CONTESTS_SCHEMA,
    SUBMISSIONS_SCHEMA,
    SOLVED_SCHEMA,
    SETTINGS_SCHEMA,
    SUBMISSIONS_BY_STUDENT_INDEX,
    SOLVED_BY_STUDENT_INDEX,
];
