use clap::Parser;

/// This program computes the statistical report of a sensory preference test.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON configuration file. See the manual of the sensory_analysis
    /// crate for the available options. Command line flags override the values of this file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, default sensory.db) The SQLite database holding the evaluations and the
    /// cached reports. It is created if it does not exist.
    #[clap(short, long, value_parser)]
    pub database: Option<String>,

    /// (integer) The identifier of the evaluation to report on.
    #[clap(short, long, value_parser)]
    pub evaluation: Option<i64>,

    /// If passed as an argument, cached reports of the evaluation are invalidated and a new
    /// report is computed.
    #[clap(long, takes_value = false)]
    pub force: bool,

    /// (file path or empty) A JSON file describing an evaluation, its products and the
    /// submissions of the panelists. It is loaded into the database before reporting.
    #[clap(short, long, value_parser)]
    pub seed: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the report in JSON format.
    /// Defaults to the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference report in JSON format. If provided, the program checks that the
    /// generated report matches the reference (the generation timestamp is not compared).
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (program and arguments, repeated) The command that writes the narrative insights.
    /// It receives the analysis in JSON format on its standard input and prints one insight per line.
    #[clap(long, value_parser, allow_hyphen_values = true)]
    pub insight_command: Option<Vec<String>>,

    /// If passed as an argument, lists the stored reports of the evaluation instead of
    /// producing one.
    #[clap(long, takes_value = false)]
    pub history: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
