//! Built-in function library for formula assistance.
//!
//! Metadata only: names, categories, syntax, and typed arguments used by
//! autocomplete and argument hints. Evaluation lives outside the core.

/// Function categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCategory {
    Math,
    Statistical,
    Logical,
    Text,
    Lookup,
    DateTime,
    Conditional,
    Trigonometry,
}

/// One typed argument in a function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub detail: &'static str,
    pub optional: bool,
    /// The argument may repeat (always the last argument).
    pub repeating: bool,
}

/// Metadata for a single built-in function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub category: FunctionCategory,
    pub syntax: &'static str,
    pub summary: &'static str,
    pub args: &'static [ArgSpec],
}

const fn req(name: &'static str, detail: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        detail,
        optional: false,
        repeating: false,
    }
}

const fn opt(name: &'static str, detail: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        detail,
        optional: true,
        repeating: false,
    }
}

const fn rep(name: &'static str, detail: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        detail,
        optional: true,
        repeating: true,
    }
}

use FunctionCategory::*;

/// Every built-in function, sorted roughly by category.
pub static FUNCTIONS: &[FunctionSpec] = &[
    // Math
    FunctionSpec {
        name: "SUM",
        category: Math,
        syntax: "SUM(number1, [number2], ...)",
        summary: "Adds all numbers in the given ranges.",
        args: &[
            req("number1", "First number or range to add."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "AVERAGE",
        category: Math,
        syntax: "AVERAGE(number1, [number2], ...)",
        summary: "Arithmetic mean of the arguments.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "MIN",
        category: Math,
        syntax: "MIN(number1, [number2], ...)",
        summary: "Smallest value among the arguments.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "MAX",
        category: Math,
        syntax: "MAX(number1, [number2], ...)",
        summary: "Largest value among the arguments.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "COUNT",
        category: Math,
        syntax: "COUNT(value1, [value2], ...)",
        summary: "Counts cells containing numbers.",
        args: &[
            req("value1", "First value or range."),
            rep("value2", "Additional values or ranges."),
        ],
    },
    FunctionSpec {
        name: "COUNTA",
        category: Math,
        syntax: "COUNTA(value1, [value2], ...)",
        summary: "Counts non-empty cells.",
        args: &[
            req("value1", "First value or range."),
            rep("value2", "Additional values or ranges."),
        ],
    },
    FunctionSpec {
        name: "ABS",
        category: Math,
        syntax: "ABS(number)",
        summary: "Absolute value of a number.",
        args: &[req("number", "The number.")],
    },
    FunctionSpec {
        name: "ROUND",
        category: Math,
        syntax: "ROUND(number, num_digits)",
        summary: "Rounds a number to a given number of digits.",
        args: &[
            req("number", "The number to round."),
            req("num_digits", "Digits to round to."),
        ],
    },
    FunctionSpec {
        name: "ROUNDUP",
        category: Math,
        syntax: "ROUNDUP(number, num_digits)",
        summary: "Rounds a number away from zero.",
        args: &[
            req("number", "The number to round."),
            req("num_digits", "Digits to round to."),
        ],
    },
    FunctionSpec {
        name: "ROUNDDOWN",
        category: Math,
        syntax: "ROUNDDOWN(number, num_digits)",
        summary: "Rounds a number toward zero.",
        args: &[
            req("number", "The number to round."),
            req("num_digits", "Digits to round to."),
        ],
    },
    FunctionSpec {
        name: "INT",
        category: Math,
        syntax: "INT(number)",
        summary: "Rounds a number down to the nearest integer.",
        args: &[req("number", "The number to round down.")],
    },
    FunctionSpec {
        name: "MOD",
        category: Math,
        syntax: "MOD(number, divisor)",
        summary: "Remainder after division.",
        args: &[
            req("number", "The dividend."),
            req("divisor", "The divisor."),
        ],
    },
    FunctionSpec {
        name: "POWER",
        category: Math,
        syntax: "POWER(number, power)",
        summary: "Raises a number to a power.",
        args: &[req("number", "The base."), req("power", "The exponent.")],
    },
    FunctionSpec {
        name: "SQRT",
        category: Math,
        syntax: "SQRT(number)",
        summary: "Square root of a number.",
        args: &[req("number", "The number.")],
    },
    FunctionSpec {
        name: "CEILING",
        category: Math,
        syntax: "CEILING(number, significance)",
        summary: "Rounds up to the nearest multiple of significance.",
        args: &[
            req("number", "The number to round."),
            req("significance", "The multiple to round to."),
        ],
    },
    FunctionSpec {
        name: "FLOOR",
        category: Math,
        syntax: "FLOOR(number, significance)",
        summary: "Rounds down to the nearest multiple of significance.",
        args: &[
            req("number", "The number to round."),
            req("significance", "The multiple to round to."),
        ],
    },
    FunctionSpec {
        name: "PRODUCT",
        category: Math,
        syntax: "PRODUCT(number1, [number2], ...)",
        summary: "Multiplies its arguments.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "LOG",
        category: Math,
        syntax: "LOG(number, [base])",
        summary: "Logarithm to a given base (default 10).",
        args: &[
            req("number", "A positive number."),
            opt("base", "The base; 10 when omitted."),
        ],
    },
    FunctionSpec {
        name: "LN",
        category: Math,
        syntax: "LN(number)",
        summary: "Natural logarithm.",
        args: &[req("number", "A positive number.")],
    },
    FunctionSpec {
        name: "EXP",
        category: Math,
        syntax: "EXP(number)",
        summary: "e raised to a power.",
        args: &[req("number", "The exponent.")],
    },
    // Statistical
    FunctionSpec {
        name: "MEDIAN",
        category: Statistical,
        syntax: "MEDIAN(number1, [number2], ...)",
        summary: "Median of the given numbers.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "STDEV",
        category: Statistical,
        syntax: "STDEV(number1, [number2], ...)",
        summary: "Sample standard deviation.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "STDEVP",
        category: Statistical,
        syntax: "STDEVP(number1, [number2], ...)",
        summary: "Population standard deviation.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "VAR",
        category: Statistical,
        syntax: "VAR(number1, [number2], ...)",
        summary: "Sample variance.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "VARP",
        category: Statistical,
        syntax: "VARP(number1, [number2], ...)",
        summary: "Population variance.",
        args: &[
            req("number1", "First number or range."),
            rep("number2", "Additional numbers or ranges."),
        ],
    },
    FunctionSpec {
        name: "RANK",
        category: Statistical,
        syntax: "RANK(number, ref, [order])",
        summary: "Rank of a number within a list.",
        args: &[
            req("number", "The number to rank."),
            req("ref", "The list of numbers."),
            opt("order", "0 descending (default), 1 ascending."),
        ],
    },
    // Logical
    FunctionSpec {
        name: "IF",
        category: Logical,
        syntax: "IF(logical_test, value_if_true, [value_if_false])",
        summary: "Chooses between two values based on a condition.",
        args: &[
            req("logical_test", "The condition to test."),
            req("value_if_true", "Result when the test is true."),
            opt("value_if_false", "Result when the test is false."),
        ],
    },
    FunctionSpec {
        name: "AND",
        category: Logical,
        syntax: "AND(logical1, [logical2], ...)",
        summary: "TRUE when every argument is true.",
        args: &[
            req("logical1", "First condition."),
            rep("logical2", "Additional conditions."),
        ],
    },
    FunctionSpec {
        name: "OR",
        category: Logical,
        syntax: "OR(logical1, [logical2], ...)",
        summary: "TRUE when any argument is true.",
        args: &[
            req("logical1", "First condition."),
            rep("logical2", "Additional conditions."),
        ],
    },
    FunctionSpec {
        name: "NOT",
        category: Logical,
        syntax: "NOT(logical)",
        summary: "Inverts a logical value.",
        args: &[req("logical", "The value to invert.")],
    },
    FunctionSpec {
        name: "IFERROR",
        category: Logical,
        syntax: "IFERROR(value, value_if_error)",
        summary: "Falls back to a value when the first errors.",
        args: &[
            req("value", "The value to check."),
            req("value_if_error", "Fallback when the value errors."),
        ],
    },
    FunctionSpec {
        name: "IFS",
        category: Logical,
        syntax: "IFS(logical_test1, value_if_true1, ...)",
        summary: "First result whose condition is true.",
        args: &[
            req("logical_test1", "First condition."),
            req("value_if_true1", "Result for the first condition."),
            rep("logical_test2", "More condition/result pairs."),
        ],
    },
    FunctionSpec {
        name: "SWITCH",
        category: Logical,
        syntax: "SWITCH(expression, value1, result1, ..., [default])",
        summary: "Matches an expression against a list of values.",
        args: &[
            req("expression", "The value to match."),
            req("value1", "First candidate."),
            req("result1", "Result for the first candidate."),
            rep("value2", "More candidate/result pairs, then a default."),
        ],
    },
    FunctionSpec {
        name: "CHOOSE",
        category: Logical,
        syntax: "CHOOSE(index_num, value1, [value2], ...)",
        summary: "Picks a value from a list by 1-based index.",
        args: &[
            req("index_num", "1-based index."),
            req("value1", "First value."),
            rep("value2", "Additional values."),
        ],
    },
    FunctionSpec {
        name: "ISBLANK",
        category: Logical,
        syntax: "ISBLANK(value)",
        summary: "TRUE when the value is blank.",
        args: &[req("value", "The value to check.")],
    },
    FunctionSpec {
        name: "ISNUMBER",
        category: Logical,
        syntax: "ISNUMBER(value)",
        summary: "TRUE when the value is a number.",
        args: &[req("value", "The value to check.")],
    },
    FunctionSpec {
        name: "ISTEXT",
        category: Logical,
        syntax: "ISTEXT(value)",
        summary: "TRUE when the value is text.",
        args: &[req("value", "The value to check.")],
    },
    FunctionSpec {
        name: "ISERROR",
        category: Logical,
        syntax: "ISERROR(value)",
        summary: "TRUE when the value is any error.",
        args: &[req("value", "The value to check.")],
    },
    // Text
    FunctionSpec {
        name: "CONCATENATE",
        category: Text,
        syntax: "CONCATENATE(text1, [text2], ...)",
        summary: "Joins text strings.",
        args: &[
            req("text1", "First text."),
            rep("text2", "Additional text."),
        ],
    },
    FunctionSpec {
        name: "CONCAT",
        category: Text,
        syntax: "CONCAT(text1, [text2], ...)",
        summary: "Joins text strings or ranges.",
        args: &[
            req("text1", "First text or range."),
            rep("text2", "Additional text or ranges."),
        ],
    },
    FunctionSpec {
        name: "LEFT",
        category: Text,
        syntax: "LEFT(text, [num_chars])",
        summary: "Leading characters of a string.",
        args: &[
            req("text", "The text."),
            opt("num_chars", "How many characters; 1 when omitted."),
        ],
    },
    FunctionSpec {
        name: "RIGHT",
        category: Text,
        syntax: "RIGHT(text, [num_chars])",
        summary: "Trailing characters of a string.",
        args: &[
            req("text", "The text."),
            opt("num_chars", "How many characters; 1 when omitted."),
        ],
    },
    FunctionSpec {
        name: "MID",
        category: Text,
        syntax: "MID(text, start_num, num_chars)",
        summary: "Characters from the middle of a string.",
        args: &[
            req("text", "The text."),
            req("start_num", "1-based start position."),
            req("num_chars", "How many characters."),
        ],
    },
    FunctionSpec {
        name: "LEN",
        category: Text,
        syntax: "LEN(text)",
        summary: "Number of characters in a string.",
        args: &[req("text", "The text.")],
    },
    FunctionSpec {
        name: "UPPER",
        category: Text,
        syntax: "UPPER(text)",
        summary: "Uppercases text.",
        args: &[req("text", "The text to convert.")],
    },
    FunctionSpec {
        name: "LOWER",
        category: Text,
        syntax: "LOWER(text)",
        summary: "Lowercases text.",
        args: &[req("text", "The text to convert.")],
    },
    FunctionSpec {
        name: "TRIM",
        category: Text,
        syntax: "TRIM(text)",
        summary: "Strips extra spaces from text.",
        args: &[req("text", "The text to trim.")],
    },
    FunctionSpec {
        name: "TEXT",
        category: Text,
        syntax: "TEXT(value, format_text)",
        summary: "Formats a number as text.",
        args: &[
            req("value", "The number to format."),
            req("format_text", "The format code."),
        ],
    },
    FunctionSpec {
        name: "VALUE",
        category: Text,
        syntax: "VALUE(text)",
        summary: "Converts text to a number.",
        args: &[req("text", "The text to convert.")],
    },
    FunctionSpec {
        name: "FIND",
        category: Text,
        syntax: "FIND(find_text, within_text, [start_num])",
        summary: "Case-sensitive position of one string in another.",
        args: &[
            req("find_text", "The text to find."),
            req("within_text", "The text to search."),
            opt("start_num", "1-based start position."),
        ],
    },
    FunctionSpec {
        name: "SUBSTITUTE",
        category: Text,
        syntax: "SUBSTITUTE(text, old_text, new_text, [instance_num])",
        summary: "Replaces occurrences of text.",
        args: &[
            req("text", "The text to modify."),
            req("old_text", "The text to replace."),
            req("new_text", "The replacement."),
            opt("instance_num", "Which occurrence; all when omitted."),
        ],
    },
    FunctionSpec {
        name: "REPT",
        category: Text,
        syntax: "REPT(text, number_times)",
        summary: "Repeats text.",
        args: &[
            req("text", "The text to repeat."),
            req("number_times", "Repetition count."),
        ],
    },
    // Conditional
    FunctionSpec {
        name: "SUMIF",
        category: Conditional,
        syntax: "SUMIF(range, criteria, [sum_range])",
        summary: "Sums cells matching a criterion.",
        args: &[
            req("range", "The range to test."),
            req("criteria", "The criterion."),
            opt("sum_range", "Cells to sum; the test range when omitted."),
        ],
    },
    FunctionSpec {
        name: "SUMIFS",
        category: Conditional,
        syntax: "SUMIFS(sum_range, criteria_range1, criteria1, ...)",
        summary: "Sums cells matching multiple criteria.",
        args: &[
            req("sum_range", "Cells to sum."),
            req("criteria_range1", "First range to test."),
            req("criteria1", "First criterion."),
            rep("criteria_range2", "More range/criterion pairs."),
        ],
    },
    FunctionSpec {
        name: "COUNTIF",
        category: Conditional,
        syntax: "COUNTIF(range, criteria)",
        summary: "Counts cells matching a criterion.",
        args: &[
            req("range", "The range to test."),
            req("criteria", "The criterion."),
        ],
    },
    FunctionSpec {
        name: "COUNTIFS",
        category: Conditional,
        syntax: "COUNTIFS(criteria_range1, criteria1, ...)",
        summary: "Counts cells matching multiple criteria.",
        args: &[
            req("criteria_range1", "First range to test."),
            req("criteria1", "First criterion."),
            rep("criteria_range2", "More range/criterion pairs."),
        ],
    },
    FunctionSpec {
        name: "AVERAGEIF",
        category: Conditional,
        syntax: "AVERAGEIF(range, criteria, [average_range])",
        summary: "Averages cells matching a criterion.",
        args: &[
            req("range", "The range to test."),
            req("criteria", "The criterion."),
            opt("average_range", "Cells to average; the test range when omitted."),
        ],
    },
    FunctionSpec {
        name: "COUNTBLANK",
        category: Conditional,
        syntax: "COUNTBLANK(range)",
        summary: "Counts blank cells in a range.",
        args: &[req("range", "The range to count.")],
    },
    // Lookup
    FunctionSpec {
        name: "VLOOKUP",
        category: Lookup,
        syntax: "VLOOKUP(lookup_value, table_array, col_index_num, [range_lookup])",
        summary: "Finds a value in the first column, returns one from the same row.",
        args: &[
            req("lookup_value", "The value to find."),
            req("table_array", "The data range."),
            req("col_index_num", "1-based column to return."),
            opt("range_lookup", "TRUE approximate, FALSE exact."),
        ],
    },
    FunctionSpec {
        name: "HLOOKUP",
        category: Lookup,
        syntax: "HLOOKUP(lookup_value, table_array, row_index_num, [range_lookup])",
        summary: "Finds a value in the first row, returns one from the same column.",
        args: &[
            req("lookup_value", "The value to find."),
            req("table_array", "The data range."),
            req("row_index_num", "1-based row to return."),
            opt("range_lookup", "TRUE approximate, FALSE exact."),
        ],
    },
    FunctionSpec {
        name: "INDEX",
        category: Lookup,
        syntax: "INDEX(array, row_num, [column_num])",
        summary: "Value at a position within a range.",
        args: &[
            req("array", "The range."),
            req("row_num", "The row within the range."),
            opt("column_num", "The column within the range."),
        ],
    },
    FunctionSpec {
        name: "MATCH",
        category: Lookup,
        syntax: "MATCH(lookup_value, lookup_array, [match_type])",
        summary: "Position of a value within a range.",
        args: &[
            req("lookup_value", "The value to find."),
            req("lookup_array", "The range to search."),
            opt("match_type", "1 below, 0 exact, -1 above."),
        ],
    },
    FunctionSpec {
        name: "ROW",
        category: Lookup,
        syntax: "ROW([reference])",
        summary: "Row number of a reference.",
        args: &[opt("reference", "The cell; current cell when omitted.")],
    },
    FunctionSpec {
        name: "COLUMN",
        category: Lookup,
        syntax: "COLUMN([reference])",
        summary: "Column number of a reference.",
        args: &[opt("reference", "The cell; current cell when omitted.")],
    },
    // Date/time
    FunctionSpec {
        name: "TODAY",
        category: DateTime,
        syntax: "TODAY()",
        summary: "Current date.",
        args: &[],
    },
    FunctionSpec {
        name: "NOW",
        category: DateTime,
        syntax: "NOW()",
        summary: "Current date and time.",
        args: &[],
    },
    FunctionSpec {
        name: "DATE",
        category: DateTime,
        syntax: "DATE(year, month, day)",
        summary: "Builds a date from components.",
        args: &[
            req("year", "The year."),
            req("month", "The month, 1-12."),
            req("day", "The day, 1-31."),
        ],
    },
    FunctionSpec {
        name: "YEAR",
        category: DateTime,
        syntax: "YEAR(serial_number)",
        summary: "Year component of a date.",
        args: &[req("serial_number", "The date.")],
    },
    FunctionSpec {
        name: "MONTH",
        category: DateTime,
        syntax: "MONTH(serial_number)",
        summary: "Month component of a date.",
        args: &[req("serial_number", "The date.")],
    },
    FunctionSpec {
        name: "DAY",
        category: DateTime,
        syntax: "DAY(serial_number)",
        summary: "Day component of a date.",
        args: &[req("serial_number", "The date.")],
    },
    // Trigonometry
    FunctionSpec {
        name: "PI",
        category: Trigonometry,
        syntax: "PI()",
        summary: "The constant pi.",
        args: &[],
    },
    FunctionSpec {
        name: "SIN",
        category: Trigonometry,
        syntax: "SIN(number)",
        summary: "Sine of an angle in radians.",
        args: &[req("number", "The angle in radians.")],
    },
    FunctionSpec {
        name: "COS",
        category: Trigonometry,
        syntax: "COS(number)",
        summary: "Cosine of an angle in radians.",
        args: &[req("number", "The angle in radians.")],
    },
    FunctionSpec {
        name: "TAN",
        category: Trigonometry,
        syntax: "TAN(number)",
        summary: "Tangent of an angle in radians.",
        args: &[req("number", "The angle in radians.")],
    },
];

/// Case-insensitive lookup by exact name.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    let upper = name.to_ascii_uppercase();
    FUNCTIONS.iter().find(|f| f.name == upper)
}

/// All functions whose name starts with the given prefix (case-insensitive).
pub fn by_prefix(prefix: &str) -> Vec<&'static FunctionSpec> {
    let upper = prefix.to_ascii_uppercase();
    FUNCTIONS.iter().filter(|f| f.name.starts_with(&upper)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_size() {
        assert!(FUNCTIONS.len() >= 50, "library has {} functions", FUNCTIONS.len());
    }

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(lookup("sum").unwrap().name, "SUM");
        assert_eq!(lookup("Vlookup").unwrap().name, "VLOOKUP");
        assert!(lookup("NOPE").is_none());
    }

    #[test]
    fn test_by_prefix() {
        let sums: Vec<&str> = by_prefix("SUM").iter().map(|f| f.name).collect();
        assert!(sums.contains(&"SUM"));
        assert!(sums.contains(&"SUMIF"));
        assert!(sums.contains(&"SUMIFS"));
    }

    #[test]
    fn test_repeating_args_are_last() {
        for f in FUNCTIONS {
            for (i, arg) in f.args.iter().enumerate() {
                if arg.repeating {
                    assert_eq!(i, f.args.len() - 1, "{}: repeating arg must be last", f.name);
                }
            }
        }
    }

    #[test]
    fn test_names_unique_and_uppercase() {
        let mut seen = std::collections::HashSet::new();
        for f in FUNCTIONS {
            assert!(seen.insert(f.name), "duplicate {}", f.name);
            assert_eq!(f.name, f.name.to_ascii_uppercase());
        }
    }
}
