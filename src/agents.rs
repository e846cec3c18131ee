//! Sequential multi-agent analysis of one report.
//!
//! Four personas run in a fixed order: the verifier checks the document is a
//! blood test report, the doctor answers the user's query, then the
//! nutritionist and the exercise physiologist build on everything before them.
//! Each step searches the report through [`ReportSearchTool`] and calls the
//! language model exactly once.

use std::collections::HashSet;

use crate::error::{AnalysisError, OrchestrationError};
use crate::llm::{ChatPrompt, LanguageModel};
use crate::retriever::{render_hit, ReportSearchTool, SEARCH_TOOL_DESCRIPTION, SEARCH_TOOL_NAME};

pub const DEFAULT_QUERY: &str = "Summarise my Blood Test Report";

#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: &'static str,
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
}

impl AgentProfile {
    pub fn system_prompt(&self) -> String {
        format!(
            "You are a {}.\nGoal: {}\n\n{}\n\nYou may only rely on results returned by the '{}' tool. {}",
            self.role, self.goal, self.backstory, SEARCH_TOOL_NAME, SEARCH_TOOL_DESCRIPTION
        )
    }
}

pub const VERIFIER: AgentProfile = AgentProfile {
    name: "verifier",
    role: "Medical Data Verifier",
    goal: "To meticulously and efficiently verify if a given document is an authentic blood test report.",
    backstory: "You are a Health Information Management specialist with a keen eye for detail. \
You validate a document in a single decisive step: one batch search for the essential \
identifiers, and the document counts as valid when at least three of them are present.",
};

pub const DOCTOR: AgentProfile = AgentProfile {
    name: "doctor",
    role: "Senior Medical Professional",
    goal: "To provide a comprehensive and accurate analysis of a blood test report through targeted \
searches, synthesizing the findings into clear, actionable advice.",
    backstory: "You are a highly experienced doctor known for diagnostic precision. For every \
biomarker the patient asks about you extract the value, units and reference range from the \
report, then give a holistic, empathetic interpretation.",
};

pub const NUTRITIONIST: AgentProfile = AgentProfile {
    name: "nutritionist",
    role: "Certified Nutritionist",
    goal: "Provide personalized dietary advice based on blood test results",
    backstory: "You are a certified nutritionist with a holistic approach to health. You believe \
food is medicine and build tailored, easy-to-follow nutrition plans around the concerns a \
medical report highlights.",
};

pub const EXERCISE_SPECIALIST: AgentProfile = AgentProfile {
    name: "exercise_specialist",
    role: "Certified Exercise Physiologist",
    goal: "Develop safe and effective exercise plans based on blood test results",
    backstory: "You are a certified exercise physiologist who understands how physiological \
markers relate to physical activity, and you design evidence-based regimens that respect any \
medical limitations.",
};

/// What a step searches for.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPlan {
    /// The user's own query.
    UserQuery,
    /// A fixed batch query (`"A" OR "B"`).
    Fixed(String),
}

impl SearchPlan {
    fn resolve(&self, query: &str) -> String {
        match self {
            SearchPlan::UserQuery => query.to_string(),
            SearchPlan::Fixed(q) => q.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentStep {
    pub name: &'static str,
    pub agent: AgentProfile,
    /// May contain `{query}`.
    pub description: String,
    pub expected_output: String,
    pub searches: Vec<SearchPlan>,
}

impl AgentStep {
    pub fn describe(&self, query: &str) -> String {
        self.description.replace("{query}", query)
    }
}

#[derive(Debug, Clone)]
pub struct StepOutput {
    pub name: String,
    pub role: String,
    pub output: String,
    /// Resolved search queries the step ran.
    pub searches: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub steps: Vec<StepOutput>,
}

impl AnalysisReport {
    /// Final narrative: one section per agent role, in execution order.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("## {}\n\n{}\n", s.role, s.output.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct Orchestrator {
    steps: Vec<AgentStep>,
    max_searches_per_step: usize,
}

impl Orchestrator {
    pub fn new(steps: Vec<AgentStep>, max_searches_per_step: usize) -> Self {
        Self {
            steps,
            max_searches_per_step,
        }
    }

    /// verification → help_patients → nutrition_analysis → exercise_planning
    pub fn standard(max_searches_per_step: usize) -> Self {
        let steps = vec![
            AgentStep {
                name: "verification",
                agent: VERIFIER,
                description: "Validate the uploaded document as a legitimate blood test report. \
Search the report once for the essential identifiers and decide: the document is valid when \
evidence for at least three of the four identifiers is present."
                    .into(),
                expected_output: "A definitive statement: 'The document appears to be a valid blood \
test report based on the presence of multiple key identifiers.' or 'The document does not \
appear to be a valid blood test report because it is missing key identifiers.'"
                    .into(),
                searches: vec![SearchPlan::Fixed(
                    r#""Patient Name" OR "Lab Results" OR "Reference Range" OR "Hemoglobin""#.into(),
                )],
            },
            AgentStep {
                name: "help_patients",
                agent: DOCTOR,
                description: "Analyze the blood test report to answer the user's query: '{query}'. \
Extract every relevant result with its value, units and reference range, explain what each \
means, and advise the user to consult a healthcare provider."
                    .into(),
                expected_output: "A well-structured answer supported by data from the report: the \
relevant lab results with values, units and reference ranges, an interpretation of each, a \
layperson summary, and a closing recommendation to consult a healthcare provider."
                    .into(),
                searches: vec![SearchPlan::UserQuery],
            },
            AgentStep {
                name: "nutrition_analysis",
                agent: NUTRITIONIST,
                description: "Provide nutrition advice for the user's query: '{query}'. Review the \
major nutritional markers in the report and give personalized, actionable dietary \
recommendations."
                    .into(),
                expected_output: "A nutrition plan: a summary of the nutrition-related results, how \
they relate to the user's nutritional status, specific dietary recommendations with a sample \
one-day meal plan, and a disclaimer that this is not medical advice."
                    .into(),
                searches: vec![SearchPlan::Fixed(
                    r#""Glucose" OR "Cholesterol" OR "HDL" OR "LDL" OR "Triglycerides" OR "Iron" OR "Vitamin D" OR "Vitamin B12""#
                        .into(),
                )],
            },
            AgentStep {
                name: "exercise_planning",
                agent: EXERCISE_SPECIALIST,
                description: "Create an exercise plan for the user's query: '{query}'. Use the lab \
results relevant to physical activity to design a safe, effective, personalized plan."
                    .into(),
                expected_output: "A personalized exercise plan: a fitness assessment from the \
relevant results, a weekly schedule with exercise types, duration and intensity, safety \
precautions for any concerns in the report, and a reminder to consult a doctor first."
                    .into(),
                searches: vec![SearchPlan::Fixed(
                    r#""Cholesterol" OR "Hemoglobin" OR "Cardiac Risk" OR "CBC""#.into(),
                )],
            },
        ];
        Self::new(steps, max_searches_per_step)
    }

    pub fn steps(&self) -> &[AgentStep] {
        &self.steps
    }

    /// Run every step in order. The first failing step aborts the run.
    pub async fn run(
        &self,
        query: &str,
        tool: &ReportSearchTool,
        model: &dyn LanguageModel,
    ) -> Result<AnalysisReport, AnalysisError> {
        let mut report = AnalysisReport::default();

        for step in &self.steps {
            tracing::info!(
                step = step.name,
                role = step.agent.role,
                tool = tool.name(),
                top_k = tool.top_k(),
                "agent step started"
            );

            let searches: Vec<String> = step
                .searches
                .iter()
                .take(self.max_searches_per_step)
                .map(|plan| plan.resolve(query))
                .collect();

            let mut seen = HashSet::new();
            let mut context: Vec<String> = Vec::new();
            for search in &searches {
                for hit in tool.search_segments(search).await? {
                    if seen.insert(hit.text.clone()) {
                        context.push(render_hit(&hit));
                    }
                }
            }

            let prompt = ChatPrompt {
                system: step.agent.system_prompt(),
                task: step.describe(query),
                context,
                previous: report
                    .steps
                    .iter()
                    .map(|s| (s.role.clone(), s.output.clone()))
                    .collect(),
                expected_output: step.expected_output.clone(),
            };

            let output = model
                .complete(&prompt)
                .await
                .map_err(|e| OrchestrationError::Step {
                    step: step.name.to_string(),
                    message: e.to_string(),
                })?;

            tracing::info!(step = step.name, chars = output.len(), "agent step finished");
            report.steps.push(StepOutput {
                name: step.name.to_string(),
                role: step.agent.role.to_string(),
                output,
                searches,
            });
        }

        Ok(report)
    }
}
