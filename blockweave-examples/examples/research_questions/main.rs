use anyhow::Result;
use blockweave::agent::{Agent, AgentConfig};
use blockweave::block::Block;
use blockweave::prompt::PromptTemplate;
use blockweave::registry::BlockTypeRegistry;
use blockweave_examples::ScriptedModel;

const TEMPLATE: &str = r#"Assume the role of an algorithm of an {[role]}.
You will behave like the algorithm below, which converts input blocks into output blocks.

{[summary]}

{[algorithm]}

{[examples]}

# HERE IS YOUR INPUT:
{[input_blocks]}

# Give your answer:
{[output_blocks]}
"#;

fn main() -> Result<()> {
    let registry = BlockTypeRegistry::new();
    let topic = registry.register("Topic")?;
    let research_questions = registry.register("ResearchQuestions")?;
    let search_criteria = registry.register("SearchCriteria")?;

    let topic_agent = Agent::new(
        [("topic_block", topic.clone())],
        [("rq_block", research_questions.clone())],
        PromptTemplate::new(TEMPLATE),
        AgentConfig {
            role: Some("expert scientific researcher".to_string()),
            summary: Some("Creates 5 research questions related to the topic".to_string()),
            algorithm: vec![
                "1. Analyze topic_block".to_string(),
                "2. Create 5 research questions".to_string(),
                "3. return the research questions as rq_block".to_string(),
            ],
            input_examples: vec!["A topic for research here".to_string()],
            output_examples: vec!["1. RQ1\n2. RQ2\n3. RQ3\n4. RQ4\n5. RQ5".to_string()],
        },
    )?;

    let criteria_agent = Agent::new(
        [("rq_block", research_questions)],
        [("criteria_block", search_criteria)],
        PromptTemplate::new(TEMPLATE),
        AgentConfig::from_json_str(r#"{
            "role": "expert scientific researcher",
            "summary": "Establishes initial search criteria",
            "algorithm": [
                "Determine the scope of the search criteria for the rq_block",
                "Create a set of search criteria that fits the domain and subject of the criteria_block"
            ],
            "output_examples": ["- The paper is from 2010 or later."]
        }"#)?,
    )?;

    let model = ScriptedModel::new([
        "Here are the questions:\n## @Block ResearchQuestions rq_block\n|---\n\
        1. How can ASR comply with the GDPR?\n\
        2. What privacy preserving ASR technologies exist?\n\
        ---|",
        "## @Block SearchCriteria criteria_block\n|---\n\
        - The paper is from 2010 or later.\n\
        - The paper mentions GDPR or privacy together with speech recognition.\n\
        ---|",
    ]);

    let input = Block::new(topic, "GDPR and speech data");
    let mocked = topic_agent.mock_invoke(&input)?;
    println!("mock answer: {:?}\n", mocked.single().map(Block::content));

    let questions = topic_agent.invoke(input, Some(&model))?;
    let criteria = criteria_agent.invoke(questions, Some(&model))?;
    if let Some(block) = criteria.single() {
        println!("----- {} -----\n{}", block.block_type(), block.content());
    }
    Ok(())
}
