use crate::report::*;

use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

/// Used in place of the narrative insights when the generator fails.
pub const FALLBACK_INSIGHTS: [&str; 3] = [
    "El análisis de preferencias muestra las tendencias generales del panel sensorial.",
    "Revise la tabla de posiciones promedio para identificar los productos mejor valorados.",
    "Considere ampliar el número de panelistas para obtener conclusiones más robustas.",
];

pub fn fallback_insights() -> Vec<String> {
    FALLBACK_INSIGHTS.iter().map(|s| s.to_string()).collect()
}

/// What the insight generator gets to see.
pub struct InsightContext<'a> {
    pub evaluations: &'a [PanelistEvaluation],
    pub products: &'a [Product],
    pub stats: &'a [PreferenceStats],
    pub analysis: &'a StatisticalAnalysis,
}

impl<'a> InsightContext<'a> {
    pub fn to_json(&self) -> JSValue {
        let evaluations: Vec<JSValue> = self.evaluations.iter().map(evaluation_to_json).collect();
        let products: Vec<JSValue> = self.products.iter().map(product_to_json).collect();
        json!({
            "evaluations": evaluations,
            "products": products,
            "preference_analysis": stats_to_json(self.stats),
            "statistical_analysis": analysis_to_json(self.analysis),
        })
    }
}

/// Writes the narrative insights of a report.
///
/// Failures are not fatal: the report cache falls back to `FALLBACK_INSIGHTS`.
pub trait InsightGenerator {
    fn generate(&self, context: &InsightContext) -> ReportResult<Vec<String>>;
}

/// The generator used when nothing is configured. It always fails.
pub struct NoInsightGenerator {}

impl InsightGenerator for NoInsightGenerator {
    fn generate(&self, _context: &InsightContext) -> ReportResult<Vec<String>> {
        InsightOutputSnafu {
            message: "no insight command configured",
        }
        .fail()
    }
}

/// Runs an external program. The context is written in JSON format on its standard
/// input, and every non-empty line of its standard output is an insight.
pub struct CommandInsightGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandInsightGenerator {
    pub fn new(program: &str, args: &[String]) -> CommandInsightGenerator {
        CommandInsightGenerator {
            program: program.to_string(),
            args: args.to_vec(),
        }
    }
}

impl InsightGenerator for CommandInsightGenerator {
    fn generate(&self, context: &InsightContext) -> ReportResult<Vec<String>> {
        let payload = serde_json::to_string(&context.to_json()).context(ParsingJsonSnafu {})?;
        debug!(
            "CommandInsightGenerator: running {:?} {:?}",
            self.program, self.args
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context(InsightSpawnSnafu {
                command: self.program.clone(),
            })?;
        // The input is written from another thread while the output is drained,
        // so that neither side blocks on a full pipe.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(payload.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output().context(InsightSpawnSnafu {
            command: self.program.clone(),
        })?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The program may exit without reading its input.
            Ok(Err(e)) => {
                debug!("CommandInsightGenerator: could not write the context: {:?}", e);
            }
            Err(_) => {
                warn!("CommandInsightGenerator: the writer thread panicked");
            }
        }
        if !output.status.success() {
            return InsightOutputSnafu {
                message: format!("{} exited with {}", self.program, output.status),
            }
            .fail();
        }
        let text = match String::from_utf8(output.stdout) {
            Ok(s) => s,
            Err(_) => {
                return InsightOutputSnafu {
                    message: "the output is not valid UTF-8",
                }
                .fail()
            }
        };
        let insights: Vec<String> = text
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect();
        if insights.is_empty() {
            return InsightOutputSnafu {
                message: "no insight produced",
            }
            .fail();
        }
        Ok(insights)
    }
}
