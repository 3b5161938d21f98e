//! # Agent
//!
//! An agent is a function implemented by one LLM call: typed input blocks go in, typed output blocks come out.
//!
//! An agent is built from named input slots, named output slots, a [PromptTemplate] and an [AgentConfig]. The
//! template may use these placeholders:
//!
//! | placeholder         | filled with                                                         | when         |
//! |---------------------|---------------------------------------------------------------------|--------------|
//! | `{[role]}`          | [AgentConfig::role]                                                 | construction |
//! | `{[summary]}`       | [AgentConfig::summary]                                              | construction |
//! | `{[algorithm]}`     | [AgentConfig::algorithm], one step per line                         | construction |
//! | `{[examples]}`      | the example blocks of [AgentConfig], rendered with the slot names   | construction |
//! | `{[output_blocks]}` | the answer scaffold of every output                                 | construction |
//! | `{[<output name>]}` | the answer scaffold of that output                                  | construction |
//! | `{[input_blocks]}`  | every input block rendered with its slot name, in declared order    | per call     |
//! | `{[<input name>]}`  | that input block rendered with its slot name                        | per call     |
//!
//! Every other placeholder is rejected when the agent is built, and so is a template that gives the model no way to
//! see an input or to learn the format of an output. After construction only the input placeholders are open.
//!
//! ## Reading the reply
//!
//! Output blocks are searched for all output types at once and kept in the order they appear in the reply. Each
//! fragment keeps the type that found it. The result must then match the declared outputs position by position, so
//! a reply that puts the blocks in another order, drops one, or repeats one fails with
//! [AgentError::OutputTypeMismatch] instead of handing out blocks under the wrong slot.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::slice;
use std::sync::Arc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use crate::agent::errors::AgentError;
use crate::block::{Block, BlockType};
use crate::filler::{Fill, FillPlaceholders, SlotValues};
use crate::llm::GenerateText;
use crate::prompt::{PartialPrompt, PromptTemplate};
use crate::utils::files::read_utf8_file;
use crate::utils::token::CountToken;

pub const ROLE_SLOT: &str = "role";
pub const SUMMARY_SLOT: &str = "summary";
pub const ALGORITHM_SLOT: &str = "algorithm";
pub const EXAMPLES_SLOT: &str = "examples";
pub const INPUT_BLOCKS_SLOT: &str = "input_blocks";
pub const OUTPUT_BLOCKS_SLOT: &str = "output_blocks";

const RESERVED_SLOTS: [&str; 6] = [ROLE_SLOT, SUMMARY_SLOT, ALGORITHM_SLOT, EXAMPLES_SLOT, INPUT_BLOCKS_SLOT, OUTPUT_BLOCKS_SLOT];

/// Content of the output scaffolds shown to the model.
pub const ANSWER_PLACEHOLDER: &str = "ANSWER HERE";
/// Content of every block returned by [Agent::mock_invoke].
pub const MOCK_RESPONSE: &str = "THIS IS A MOCK RESPONSE FOR TESTING PURPOSES ONLY";

/// Static description of an agent, filled into the template once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Who performs the task, e.g. "expert scientific researcher".
    pub role: Option<String>,
    /// What the agent does, in one line.
    pub summary: Option<String>,
    /// Steps of the task, one per line.
    pub algorithm: Vec<String>,
    /// One example content per input, in declared order. Empty for no example.
    pub input_examples: Vec<String>,
    /// One example content per output, in declared order. Empty for no example.
    pub output_examples: Vec<String>,
}

impl AgentConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let json = read_utf8_file(path)?;
        Self::from_json_str(&json)
    }
}

/// A named input or output of an agent.
#[derive(Debug, Clone)]
#[readonly::make]
pub struct BlockSlot {
    #[readonly]
    pub name: String,
    #[readonly]
    pub block_type: BlockType,
}

impl BlockSlot {
    fn new(name: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            name: name.into(),
            block_type,
        }
    }
}

/// Input blocks of a call. Built from a single [Block], a list of blocks or the output of another agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blocks(pub Vec<Block>);

impl Blocks {
    pub fn as_slice(&self) -> &[Block] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Block> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Block> for Blocks {
    fn from(block: Block) -> Self {
        Blocks(vec![block])
    }
}

impl From<&Block> for Blocks {
    fn from(block: &Block) -> Self {
        Blocks(vec![block.clone()])
    }
}

impl From<Vec<Block>> for Blocks {
    fn from(blocks: Vec<Block>) -> Self {
        Blocks(blocks)
    }
}

impl From<&[Block]> for Blocks {
    fn from(blocks: &[Block]) -> Self {
        Blocks(blocks.to_vec())
    }
}

impl<const N: usize> From<[Block; N]> for Blocks {
    fn from(blocks: [Block; N]) -> Self {
        Blocks(blocks.into())
    }
}

impl From<AgentOutput> for Blocks {
    fn from(output: AgentOutput) -> Self {
        Blocks(output.into_blocks())
    }
}

impl From<&AgentOutput> for Blocks {
    fn from(output: &AgentOutput) -> Self {
        Blocks(output.blocks().to_vec())
    }
}

/// Result of an agent call: a bare block when the agent has one output, otherwise all of them in declared order.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentOutput {
    Single(Block),
    Multiple(Vec<Block>),
}

impl AgentOutput {
    fn from_blocks(mut blocks: Vec<Block>) -> Self {
        if blocks.len() == 1 {
            if let Some(block) = blocks.pop() {
                return AgentOutput::Single(block);
            }
        }
        AgentOutput::Multiple(blocks)
    }

    pub fn single(&self) -> Option<&Block> {
        match self {
            AgentOutput::Single(block) => Some(block),
            AgentOutput::Multiple(_) => None,
        }
    }

    pub fn into_single(self) -> Option<Block> {
        match self {
            AgentOutput::Single(block) => Some(block),
            AgentOutput::Multiple(_) => None,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        match self {
            AgentOutput::Single(block) => slice::from_ref(block),
            AgentOutput::Multiple(blocks) => blocks,
        }
    }

    pub fn into_blocks(self) -> Vec<Block> {
        match self {
            AgentOutput::Single(block) => vec![block],
            AgentOutput::Multiple(blocks) => blocks,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks().is_empty()
    }
}

/// A prompt template with a typed contract, see the [module docs](self).
///
/// Agents hold no per-call state and can be reused for any number of calls.
#[derive(Clone)]
pub struct Agent {
    inputs: Vec<BlockSlot>,
    outputs: Vec<BlockSlot>,
    prompt: PartialPrompt,
    default_llm: Option<Arc<dyn GenerateText + Send + Sync>>,
}

impl Agent {
    /// Build an agent and fill everything but the input placeholders of the template.
    pub fn new<I, O, N, M>(inputs: I, outputs: O, template: PromptTemplate, config: AgentConfig) -> Result<Self, AgentError>
        where I: IntoIterator<Item=(N, BlockType)>,
              O: IntoIterator<Item=(M, BlockType)>,
              N: Into<String>,
              M: Into<String> {
        let inputs: Vec<BlockSlot> = inputs.into_iter().map(|(name, block_type)| BlockSlot::new(name, block_type)).collect();
        let outputs: Vec<BlockSlot> = outputs.into_iter().map(|(name, block_type)| BlockSlot::new(name, block_type)).collect();
        if outputs.is_empty() {
            return Err(AgentError::NoOutputs);
        }
        check_slot_names(&inputs, &outputs)?;
        check_placeholders(&template, &inputs, &outputs)?;

        let statics = static_values(&template, &inputs, &outputs, &config)?;
        let mut prompt = template.construct_prompt();
        statics.fill(&mut prompt)?;
        debug!("built agent {:?} -> {:?}, filled {:?}, open placeholders: {:?}",
            inputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            outputs.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            statics.placeholders_to_fill(),
            prompt.unfilled_placeholders());

        Ok(Self {
            inputs,
            outputs,
            prompt,
            default_llm: None,
        })
    }

    /// Set the model used when a call does not bring its own.
    pub fn with_default_llm(mut self, llm: impl GenerateText + Send + Sync + 'static) -> Self {
        self.default_llm = Some(Arc::new(llm));
        self
    }

    pub fn inputs(&self) -> &[BlockSlot] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[BlockSlot] {
        &self.outputs
    }

    /// The template with everything but the input placeholders filled.
    pub fn partial_prompt(&self) -> &PartialPrompt {
        &self.prompt
    }

    /// Check the input contract and return the prompt that [Agent::invoke] would send.
    pub fn full_prompt(&self, blocks: impl Into<Blocks>) -> Result<String, AgentError> {
        let blocks = blocks.into();
        self.check_inputs(&blocks)?;
        let mut prompt = self.prompt.clone();
        self.input_values(&blocks)?.fill(&mut prompt)?;
        Ok(prompt.complete()?)
    }

    /// Count the tokens of the prompt for these inputs.
    pub fn prompt_token_count(&self, blocks: impl Into<Blocks>, counter: &impl CountToken) -> Result<usize, AgentError> {
        let prompt = self.full_prompt(blocks)?;
        Ok(counter.count_token(&prompt))
    }

    /// Run the agent: render the prompt, call the model once and read the output blocks from the reply.
    ///
    /// `llm` takes precedence over the default model. Input errors are raised before the model is called. The call
    /// blocks until the model returns, timeouts and retries are up to the model.
    pub fn invoke(&self, blocks: impl Into<Blocks>, llm: Option<&dyn GenerateText>) -> Result<AgentOutput, AgentError> {
        let prompt = self.full_prompt(blocks)?;
        let llm: &dyn GenerateText = match llm {
            Some(llm) => llm,
            None => match self.default_llm.as_deref() {
                Some(default_llm) => {
                    debug!("no model given for this call, using the default model of the agent");
                    default_llm
                }
                None => return Err(AgentError::NoModelConfigured),
            },
        };
        info!("calling model with a prompt of {} bytes", prompt.len());
        let response = llm.generate(&prompt).map_err(AgentError::Model)?;
        info!("model replied with {} bytes", response.len());
        self.parse_response(&response)
    }

    /// Read the output blocks from a reply that was obtained some other way, e.g. for a prompt from
    /// [Agent::full_prompt].
    pub fn parse_response(&self, response: &str) -> Result<AgentOutput, AgentError> {
        let output_types: Vec<BlockType> = self.outputs.iter().map(|slot| slot.block_type.clone()).collect();
        let blocks = BlockType::locate_all_typed(&output_types, response)
            .into_iter()
            .map(|located| Block::from_delimited_text(located.block_type, located.text))
            .collect::<Result<Vec<_>, _>>()?;

        let contract_holds = blocks.len() == self.outputs.len()
            && blocks.iter().zip(&self.outputs).all(|(block, slot)| block.type_matches(&slot.block_type));
        if !contract_holds {
            let expected = type_names(self.outputs.iter().map(|slot| &slot.block_type));
            let got = type_names(blocks.iter().map(Block::block_type));
            warn!("model reply does not match the output contract, expected {:?} but got {:?}", expected, got);
            return Err(AgentError::OutputTypeMismatch {
                expected,
                got,
                response: response.to_string(),
            });
        }
        Ok(AgentOutput::from_blocks(blocks))
    }

    /// Check the inputs and assemble the prompt like [Agent::invoke], then answer every output with
    /// [MOCK_RESPONSE] without calling any model.
    pub fn mock_invoke(&self, blocks: impl Into<Blocks>) -> Result<AgentOutput, AgentError> {
        let prompt = self.full_prompt(blocks)?;
        debug!("mock call, prompt of {} bytes is not sent", prompt.len());
        let blocks = self.outputs
            .iter()
            .map(|slot| Block::new(slot.block_type.clone(), MOCK_RESPONSE))
            .collect();
        Ok(AgentOutput::from_blocks(blocks))
    }

    fn check_inputs(&self, blocks: &Blocks) -> Result<(), AgentError> {
        if blocks.len() != self.inputs.len() {
            return Err(AgentError::Arity {
                expected: self.inputs.len(),
                got: blocks.len(),
            });
        }
        let types_match = blocks.as_slice().iter().zip(&self.inputs).all(|(block, slot)| block.type_matches(&slot.block_type));
        if !types_match {
            return Err(AgentError::TypeMismatch {
                expected: type_names(self.inputs.iter().map(|slot| &slot.block_type)),
                got: type_names(blocks.as_slice().iter().map(Block::block_type)),
            });
        }
        Ok(())
    }

    fn input_values(&self, blocks: &Blocks) -> Result<SlotValues, AgentError> {
        let rendered = render_named(&self.inputs, blocks.as_slice().iter().map(Block::content))?;
        let mut values = SlotValues::new();
        for (slot, block) in self.inputs.iter().zip(&rendered) {
            if self.prompt.has_placeholder(&slot.name) {
                values.push(slot.name.as_str(), block.as_str());
            }
        }
        if self.prompt.has_placeholder(INPUT_BLOCKS_SLOT) {
            values.push(INPUT_BLOCKS_SLOT, rendered.join("\n"));
        }
        Ok(values)
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prompt.preview())
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("has_default_llm", &self.default_llm.is_some())
            .finish()
    }
}

fn type_names<'a>(block_types: impl Iterator<Item=&'a BlockType>) -> Vec<String> {
    block_types.map(|block_type| block_type.name().to_string()).collect()
}

/// Render one block per slot, named after the slot.
fn render_named<'a>(slots: &[BlockSlot], contents: impl Iterator<Item=&'a str>) -> Result<Vec<String>, AgentError> {
    slots.iter()
        .zip(contents)
        .map(|(slot, content)| Block::new(slot.block_type.clone(), content).render(Some(&slot.name)).map_err(AgentError::from))
        .collect()
}

fn check_slot_names(inputs: &[BlockSlot], outputs: &[BlockSlot]) -> Result<(), AgentError> {
    let mut seen = HashSet::new();
    for slot in inputs.iter().chain(outputs) {
        if slot.name.is_empty() || slot.name.chars().any(char::is_whitespace) {
            return Err(AgentError::InvalidSlotName { name: slot.name.clone() });
        }
        if RESERVED_SLOTS.contains(&slot.name.as_str()) || !seen.insert(slot.name.as_str()) {
            return Err(AgentError::DuplicateSlotName { name: slot.name.clone() });
        }
    }
    Ok(())
}

fn check_placeholders(template: &PromptTemplate, inputs: &[BlockSlot], outputs: &[BlockSlot]) -> Result<(), AgentError> {
    let placeholders = &template.placeholders;
    let mut supported: Vec<String> = RESERVED_SLOTS.iter().map(|s| s.to_string())
        .chain(inputs.iter().chain(outputs).map(|slot| slot.name.clone()))
        .collect();
    let mut unsupported: Vec<&String> = placeholders.iter().filter(|p| !supported.contains(p)).collect();
    unsupported.sort();
    if let Some(placeholder) = unsupported.first() {
        supported.sort();
        return Err(AgentError::UnsupportedPlaceholder {
            placeholder: placeholder.to_string(),
            supported,
        });
    }
    for (aggregate, slots) in [(INPUT_BLOCKS_SLOT, inputs), (OUTPUT_BLOCKS_SLOT, outputs)] {
        if placeholders.contains(aggregate) {
            continue;
        }
        if let Some(slot) = slots.iter().find(|slot| !placeholders.contains(&slot.name)) {
            return Err(AgentError::MissingPlaceholder { placeholder: slot.name.clone() });
        }
    }
    Ok(())
}

fn static_values(template: &PromptTemplate,
                 inputs: &[BlockSlot],
                 outputs: &[BlockSlot],
                 config: &AgentConfig) -> Result<SlotValues, AgentError> {
    let placeholders = &template.placeholders;
    let missing = |placeholder: &str| AgentError::MissingSlotValue { placeholder: placeholder.to_string() };
    let mut values = SlotValues::new();

    if placeholders.contains(ROLE_SLOT) {
        values.push(ROLE_SLOT, config.role.as_deref().ok_or_else(|| missing(ROLE_SLOT))?);
    }
    if placeholders.contains(SUMMARY_SLOT) {
        values.push(SUMMARY_SLOT, config.summary.as_deref().ok_or_else(|| missing(SUMMARY_SLOT))?);
    }
    if placeholders.contains(ALGORITHM_SLOT) {
        if config.algorithm.is_empty() {
            return Err(missing(ALGORITHM_SLOT));
        }
        values.push(ALGORITHM_SLOT, config.algorithm.join("\n"));
    }

    // examples are checked even when the template does not show them
    let examples = render_examples(inputs, outputs, config)?;
    if placeholders.contains(EXAMPLES_SLOT) {
        values.push(EXAMPLES_SLOT, examples.ok_or_else(|| missing(EXAMPLES_SLOT))?);
    }

    let scaffolds = render_named(outputs, outputs.iter().map(|_| ANSWER_PLACEHOLDER))?;
    for (slot, scaffold) in outputs.iter().zip(&scaffolds) {
        if placeholders.contains(&slot.name) {
            values.push(slot.name.as_str(), scaffold.as_str());
        }
    }
    if placeholders.contains(OUTPUT_BLOCKS_SLOT) {
        values.push(OUTPUT_BLOCKS_SLOT, scaffolds.join("\n"));
    }
    Ok(values)
}

fn render_examples(inputs: &[BlockSlot], outputs: &[BlockSlot], config: &AgentConfig) -> Result<Option<String>, AgentError> {
    let mut sections = Vec::new();
    for (direction, slots, examples) in [("input", inputs, &config.input_examples), ("output", outputs, &config.output_examples)] {
        if examples.is_empty() {
            continue;
        }
        if examples.len() != slots.len() {
            return Err(AgentError::ExampleArity {
                direction,
                expected: slots.len(),
                got: examples.len(),
            });
        }
        let rendered = render_named(slots, examples.iter().map(String::as_str))?;
        sections.push(format!("Example {}:\n{}", direction, rendered.join("\n")));
    }
    Ok(if sections.is_empty() { None } else { Some(sections.join("\n\n")) })
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;
    use crate::block::errors::{ContentConflict, NoMatch};
    use crate::prompt::errors::{PlaceholderNotExist, UnfilledPlaceholders};

    /// Everything that can go wrong when building or calling an agent.
    #[derive(Debug)]
    pub enum AgentError {
        /// Wrong number of input blocks. Raised before the model is called.
        Arity {
            expected: usize,
            got: usize,
        },
        /// Input blocks of the wrong types, by position. Raised before the model is called.
        TypeMismatch {
            expected: Vec<String>,
            got: Vec<String>,
        },
        /// No model given for the call and no default model on the agent.
        NoModelConfigured,
        /// The blocks found in the reply do not match the declared outputs. Carries the raw reply.
        OutputTypeMismatch {
            expected: Vec<String>,
            got: Vec<String>,
            response: String,
        },
        /// The model itself failed.
        Model(anyhow::Error),
        /// A block could not be rendered.
        Render(ContentConflict),
        NoMatch(NoMatch),
        NoOutputs,
        InvalidSlotName {
            name: String,
        },
        /// Slot names repeat or take a reserved placeholder name.
        DuplicateSlotName {
            name: String,
        },
        UnsupportedPlaceholder {
            placeholder: String,
            supported: Vec<String>,
        },
        /// The template gives the model no view of this input or output.
        MissingPlaceholder {
            placeholder: String,
        },
        /// The template uses a placeholder the config has no value for.
        MissingSlotValue {
            placeholder: String,
        },
        ExampleArity {
            direction: &'static str,
            expected: usize,
            got: usize,
        },
        PlaceholderNotExist(PlaceholderNotExist),
        Unfilled(UnfilledPlaceholders),
    }

    impl fmt::Display for AgentError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match self {
                AgentError::Arity { expected, got } =>
                    write!(f, "ArityError: expected {} input blocks, but got {}", expected, got),
                AgentError::TypeMismatch { expected, got } =>
                    write!(f, "TypeMismatchError: expected input block types {:?} but got {:?}", expected, got),
                AgentError::NoModelConfigured =>
                    write!(f, "NoModelConfiguredError: no model was given to send the prompt to. \
                    Provide one when calling the agent or set a default model on it, \
                    or use `full_prompt` to get the prompt and call the model yourself"),
                AgentError::OutputTypeMismatch { expected, got, response } =>
                    write!(f, "OutputTypeMismatchError: expected output block types {:?} but the model returned {:?}. Model reply:\n{}",
                           expected, got, response),
                AgentError::Model(e) => write!(f, "ModelError: {}", e),
                AgentError::Render(e) => write!(f, "{}", e),
                AgentError::NoMatch(e) => write!(f, "{}", e),
                AgentError::NoOutputs => write!(f, "NoOutputs: an agent needs at least one output block"),
                AgentError::InvalidSlotName { name } =>
                    write!(f, "InvalidSlotName: {:?} cannot name a block slot, names must be non-empty without whitespace", name),
                AgentError::DuplicateSlotName { name } =>
                    write!(f, "DuplicateSlotName: {} is used twice or is a reserved placeholder name", name),
                AgentError::UnsupportedPlaceholder { placeholder, supported } =>
                    write!(f, "UnsupportedPlaceholder: the template uses {} but the agent can only fill {:?}", placeholder, supported),
                AgentError::MissingPlaceholder { placeholder } =>
                    write!(f, "MissingPlaceholder: the template has neither a placeholder for {} nor an aggregate block placeholder", placeholder),
                AgentError::MissingSlotValue { placeholder } =>
                    write!(f, "MissingSlotValue: the template uses {} but the agent config has no value for it", placeholder),
                AgentError::ExampleArity { direction, expected, got } =>
                    write!(f, "ExampleArity: expected {} {} examples, but got {}", expected, direction, got),
                AgentError::PlaceholderNotExist(e) => write!(f, "{}", e),
                AgentError::Unfilled(e) => write!(f, "{}", e),
            }
        }
    }

    impl Error for AgentError {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            match self {
                AgentError::Model(e) => Some(&**e),
                AgentError::Render(e) => Some(e),
                AgentError::NoMatch(e) => Some(e),
                AgentError::PlaceholderNotExist(e) => Some(e),
                AgentError::Unfilled(e) => Some(e),
                _ => None,
            }
        }
    }

    impl From<ContentConflict> for AgentError {
        fn from(e: ContentConflict) -> Self {
            AgentError::Render(e)
        }
    }

    impl From<NoMatch> for AgentError {
        fn from(e: NoMatch) -> Self {
            AgentError::NoMatch(e)
        }
    }

    impl From<PlaceholderNotExist> for AgentError {
        fn from(e: PlaceholderNotExist) -> Self {
            AgentError::PlaceholderNotExist(e)
        }
    }

    impl From<UnfilledPlaceholders> for AgentError {
        fn from(e: UnfilledPlaceholders) -> Self {
            AgentError::Unfilled(e)
        }
    }
}

#[cfg(test)]
mod test_agent {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use anyhow::{anyhow, Result};
    use super::errors::AgentError;
    use super::{Agent, AgentConfig, AgentOutput, Blocks, ANSWER_PLACEHOLDER, MOCK_RESPONSE};
    use crate::block::{Block, BlockType};
    use crate::llm::GenerateText;
    use crate::prompt::PromptTemplate;
    use crate::registry::BlockTypeRegistry;
    use crate::utils::token::count_tokens_by_len;

    const RQ_TEMPLATE: &str = "Assume the role of an algorithm of an {[role]}.\n\
        {[summary]}\n\n\
        Algorithm:\n{[algorithm]}\n\n\
        # HERE IS YOUR INPUT:\n{[input_blocks]}\n\n\
        # Give your answer:\n{[rq_block]}\n";

    /// Counts calls, remembers the last prompt and always gives the same reply.
    #[derive(Clone)]
    struct SpyModel {
        calls: Arc<AtomicUsize>,
        last_prompt: Arc<Mutex<Option<String>>>,
        reply: String,
    }

    impl SpyModel {
        fn new(reply: impl Into<String>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                last_prompt: Arc::new(Mutex::new(None)),
                reply: reply.into(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_prompt(&self) -> Option<String> {
            self.last_prompt.lock().unwrap().clone()
        }
    }

    impl GenerateText for SpyModel {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct Fixture {
        topic: BlockType,
        research_questions: BlockType,
        agent: Agent,
    }

    fn rq_config() -> AgentConfig {
        AgentConfig {
            role: Some("expert scientific researcher".to_string()),
            summary: Some("Creates 5 research questions related to the topic".to_string()),
            algorithm: vec![
                "1. Analyze topic_block".to_string(),
                "2. Create 5 research questions".to_string(),
                "3. return the research questions as rq_block".to_string(),
            ],
            ..AgentConfig::default()
        }
    }

    fn fixture() -> Fixture {
        let registry = BlockTypeRegistry::new();
        let topic = registry.register("Topic").unwrap();
        let research_questions = registry.register("ResearchQuestions").unwrap();
        let agent = Agent::new(
            [("topic_block", topic.clone())],
            [("rq_block", research_questions.clone())],
            PromptTemplate::new(RQ_TEMPLATE),
            rq_config(),
        ).unwrap();
        Fixture { topic, research_questions, agent }
    }

    #[test]
    fn test_full_prompt() {
        let Fixture { topic, agent, .. } = fixture();
        let prompt = agent.full_prompt(Block::new(topic, "GDPR and speech data")).unwrap();
        let expected = "Assume the role of an algorithm of an expert scientific researcher.\n\
            Creates 5 research questions related to the topic\n\n\
            Algorithm:\n\
            1. Analyze topic_block\n\
            2. Create 5 research questions\n\
            3. return the research questions as rq_block\n\n\
            # HERE IS YOUR INPUT:\n\
            ## @Block Topic topic_block\n|---\nGDPR and speech data\n---|\n\n\
            # Give your answer:\n\
            ## @Block ResearchQuestions rq_block\n|---\nANSWER HERE\n---|\n";
        assert_eq!(expected, prompt);
    }

    #[test]
    fn test_only_input_placeholders_stay_open() {
        let Fixture { agent, .. } = fixture();
        let open: Vec<&str> = agent.partial_prompt().unfilled_placeholders().iter().map(String::as_str).collect();
        assert_eq!(vec!["input_blocks"], open);
        let shown = agent.to_string();
        assert!(shown.contains("# HERE IS YOUR INPUT:\n{[input_blocks]}"));
        assert!(shown.contains(ANSWER_PLACEHOLDER));
    }

    #[test]
    fn test_invoke_end_to_end() {
        let Fixture { topic, agent, .. } = fixture();
        let reply = "Sure, here are the questions.\n\n\
            ## @Block ResearchQuestions rq_block\n|---\n1. RQ1\n2. RQ2\n---|\n\nHope this helps!";
        let model = SpyModel::new(reply);
        let output = agent.invoke(Block::new(topic, "GDPR and speech data"), Some(&model)).unwrap();
        let block = output.single().expect("one output declared");
        assert_eq!("1. RQ1\n2. RQ2", block.content());
        assert_eq!("ResearchQuestions", block.block_type().name());
        assert_eq!(1, model.calls());
        assert!(model.last_prompt().unwrap().contains("|---\nGDPR and speech data\n---|"));
    }

    #[test]
    fn test_single_output_is_bare_block() {
        let Fixture { topic, research_questions, agent } = fixture();
        let rendered = Block::new(research_questions, "1. RQ1").render(Some("rq_block")).unwrap();
        let model = SpyModel::new(rendered);
        assert!(matches!(agent.invoke(Block::new(topic, "x"), Some(&model)).unwrap(), AgentOutput::Single(_)));
    }

    #[test]
    fn test_arity_checked_before_model_call() {
        let Fixture { topic, agent, .. } = fixture();
        let model = SpyModel::new("unused");

        match agent.invoke(Vec::<Block>::new(), Some(&model)) {
            Err(AgentError::Arity { expected: 1, got: 0 }) => {}
            other => panic!("expected ArityError, got {:?}", other),
        }
        let two = vec![Block::new(topic.clone(), "a"), Block::new(topic, "b")];
        match agent.invoke(two, Some(&model)) {
            Err(AgentError::Arity { expected: 1, got: 2 }) => {}
            other => panic!("expected ArityError, got {:?}", other),
        }
        assert_eq!(0, model.calls());
    }

    #[test]
    fn test_type_checked_before_model_call() {
        let Fixture { research_questions, agent, .. } = fixture();
        let model = SpyModel::new("unused");
        match agent.invoke(Block::new(research_questions, "1. RQ1"), Some(&model)) {
            Err(AgentError::TypeMismatch { expected, got }) => {
                assert_eq!(vec!["Topic"], expected);
                assert_eq!(vec!["ResearchQuestions"], got);
            }
            other => panic!("expected TypeMismatchError, got {:?}", other),
        }
        assert_eq!(0, model.calls());
    }

    #[test]
    fn test_delimiter_in_input_fails_before_model_call() {
        let Fixture { topic, agent, .. } = fixture();
        let model = SpyModel::new("unused");
        let result = agent.invoke(Block::new(topic, "contains ---| a delimiter"), Some(&model));
        assert!(matches!(result, Err(AgentError::Render(_))));
        assert_eq!(0, model.calls());
    }

    #[test]
    fn test_no_model_configured() {
        let Fixture { topic, agent, .. } = fixture();
        assert!(matches!(agent.invoke(Block::new(topic, "x"), None), Err(AgentError::NoModelConfigured)));
    }

    #[test]
    fn test_default_model_and_override() {
        let Fixture { topic, research_questions, agent } = fixture();
        let reply = Block::new(research_questions, "from default").render(Some("rq_block")).unwrap();
        let default_model = SpyModel::new(reply);
        let agent = agent.with_default_llm(default_model.clone());

        let output = agent.invoke(Block::new(topic.clone(), "x"), None).unwrap();
        assert_eq!("from default", output.single().unwrap().content());
        assert_eq!(1, default_model.calls());

        let explicit = |_: &str| "## @Block ResearchQuestions rq_block\n|---\nfrom explicit\n---|".to_string();
        let output = agent.invoke(Block::new(topic, "x"), Some(&explicit)).unwrap();
        assert_eq!("from explicit", output.single().unwrap().content());
        assert_eq!(1, default_model.calls());
    }

    #[test]
    fn test_model_failure_propagates() {
        struct Failing;
        impl GenerateText for Failing {
            fn generate(&self, _prompt: &str) -> Result<String> {
                Err(anyhow!("rate limited"))
            }
        }
        let Fixture { topic, agent, .. } = fixture();
        match agent.invoke(Block::new(topic, "x"), Some(&Failing)) {
            Err(AgentError::Model(e)) => assert_eq!("rate limited", e.to_string()),
            other => panic!("expected model error, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_without_blocks_keeps_response() {
        let Fixture { topic, agent, .. } = fixture();
        let model = SpyModel::new("I cannot answer that.");
        match agent.invoke(Block::new(topic, "x"), Some(&model)) {
            Err(AgentError::OutputTypeMismatch { expected, got, response }) => {
                assert_eq!(vec!["ResearchQuestions"], expected);
                assert!(got.is_empty());
                assert_eq!("I cannot answer that.", response);
            }
            other => panic!("expected OutputTypeMismatchError, got {:?}", other),
        }
    }

    fn two_output_agent() -> (BlockType, BlockType, BlockType, Agent) {
        let registry = BlockTypeRegistry::new();
        let topic = registry.register("Topic").unwrap();
        let a = registry.register("A").unwrap();
        let b = registry.register("B").unwrap();
        let agent = Agent::new(
            [("topic_block", topic.clone())],
            [("a_block", a.clone()), ("b_block", b.clone())],
            PromptTemplate::new("{[input_blocks]}\n\nAnswer with:\n{[output_blocks]}"),
            AgentConfig::default(),
        ).unwrap();
        (topic, a, b, agent)
    }

    #[test]
    fn test_multiple_outputs_in_declared_order() {
        let (topic, a, b, agent) = two_output_agent();
        let reply = format!("{}\n\n{}", a.fill("a_block", "first").unwrap(), b.fill("b_block", "second").unwrap());
        let output = agent.invoke(Block::new(topic, "x"), Some(&SpyModel::new(reply))).unwrap();
        match output {
            AgentOutput::Multiple(blocks) => {
                assert_eq!(2, blocks.len());
                assert!(blocks[0].type_matches(&a));
                assert_eq!("first", blocks[0].content());
                assert!(blocks[1].type_matches(&b));
                assert_eq!("second", blocks[1].content());
            }
            other => panic!("expected two blocks, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_order_outputs_fail_instead_of_swapping() {
        let (topic, a, b, agent) = two_output_agent();
        // B appears before A: blocks keep the type that found them and the positional check rejects the reply
        let reply = format!("{}\n{}", b.fill("b_block", "bee").unwrap(), a.fill("a_block", "ay").unwrap());
        match agent.invoke(Block::new(topic, "x"), Some(&SpyModel::new(reply.clone()))) {
            Err(AgentError::OutputTypeMismatch { expected, got, response }) => {
                assert_eq!(vec!["A", "B"], expected);
                assert_eq!(vec!["B", "A"], got);
                assert_eq!(reply, response);
            }
            other => panic!("expected OutputTypeMismatchError, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_extra_outputs_fail() {
        let (topic, a, b, agent) = two_output_agent();
        let only_a = a.fill("a_block", "ay").unwrap();
        assert!(matches!(agent.invoke(Block::new(topic.clone(), "x"), Some(&SpyModel::new(only_a))),
            Err(AgentError::OutputTypeMismatch { .. })));

        let extra = format!("{}\n{}\n{}", a.fill("a_block", "ay").unwrap(), b.fill("b_block", "bee").unwrap(), b.fill("b_block", "again").unwrap());
        match agent.parse_response(&extra) {
            Err(AgentError::OutputTypeMismatch { got, .. }) => assert_eq!(vec!["A", "B", "B"], got),
            other => panic!("expected OutputTypeMismatchError, got {:?}", other),
        }
    }

    #[test]
    fn test_mock_invoke_never_touches_model() {
        let Fixture { topic, research_questions, agent } = fixture();
        let default_model = SpyModel::new("unused");
        let agent = agent.with_default_llm(default_model.clone());

        let output = agent.mock_invoke(Block::new(topic, "x")).unwrap();
        let block = output.into_single().expect("one output declared");
        assert_eq!(MOCK_RESPONSE, block.content());
        assert!(block.type_matches(&research_questions));
        assert_eq!(0, default_model.calls());

        assert!(matches!(agent.mock_invoke(Block::new(research_questions, "x")), Err(AgentError::TypeMismatch { .. })));
    }

    #[test]
    fn test_mock_invoke_multiple_outputs() {
        let (topic, _, _, agent) = two_output_agent();
        let output = agent.mock_invoke(Block::new(topic, "x")).unwrap();
        assert_eq!(2, output.len());
        assert!(output.blocks().iter().all(|b| b.content() == MOCK_RESPONSE));
    }

    #[test]
    fn test_chain_agents() {
        let Fixture { topic, research_questions, agent } = fixture();
        let criteria = BlockTypeRegistry::new().register("SearchCriteria").unwrap();
        let criteria_agent = Agent::new(
            [("rq_block", research_questions.clone())],
            [("criteria_block", criteria.clone())],
            PromptTemplate::new("Determine search criteria for {[rq_block]}\n{[criteria_block]}"),
            AgentConfig::default(),
        ).unwrap();

        let questions = agent.mock_invoke(Block::new(topic, "GDPR and speech data")).unwrap();
        let model = SpyModel::new(criteria.fill("criteria_block", "- from 2010 or later").unwrap());
        let output = criteria_agent.invoke(questions, Some(&model)).unwrap();
        assert_eq!("- from 2010 or later", output.single().unwrap().content());
        let prompt = model.last_prompt().unwrap();
        assert!(prompt.starts_with(&format!("Determine search criteria for ## @Block ResearchQuestions rq_block\n|---\n{}\n---|", MOCK_RESPONSE)));
    }

    #[test]
    fn test_named_input_slots_and_zero_inputs() {
        let registry = BlockTypeRegistry::new();
        let topic = registry.register("Topic").unwrap();
        let context = registry.register("Context").unwrap();
        let answer = registry.register("Answer").unwrap();
        let agent = Agent::new(
            [("topic_block", topic.clone()), ("context_block", context.clone())],
            [("answer_block", answer.clone())],
            PromptTemplate::new("Context first:\n{[context_block]}\nThen the topic:\n{[topic_block]}\n{[answer_block]}"),
            AgentConfig::default(),
        ).unwrap();
        let prompt = agent.full_prompt([Block::new(topic.clone(), "t"), Block::new(context.clone(), "c")]).unwrap();
        assert!(prompt.starts_with("Context first:\n## @Block Context context_block\n|---\nc\n---|\nThen the topic:\n## @Block Topic topic_block"));

        // declared order is positional, swapping the blocks is a type error
        assert!(matches!(agent.full_prompt([Block::new(context, "c"), Block::new(topic, "t")]), Err(AgentError::TypeMismatch { .. })));

        let no_inputs = Agent::new(
            Vec::<(String, BlockType)>::new(),
            [("answer_block", answer)],
            PromptTemplate::new("Say something.\n{[answer_block]}"),
            AgentConfig::default(),
        ).unwrap();
        assert!(no_inputs.full_prompt(Blocks::default()).unwrap().starts_with("Say something.\n## @Block Answer answer_block"));
    }

    #[test]
    fn test_examples_rendered_with_slot_names() {
        let registry = BlockTypeRegistry::new();
        let topic = registry.register("Topic").unwrap();
        let rq = registry.register("ResearchQuestions").unwrap();
        let config = AgentConfig {
            input_examples: vec!["A topic for research here".to_string()],
            output_examples: vec!["1. RQ1\n2. RQ2".to_string()],
            ..AgentConfig::default()
        };
        let agent = Agent::new(
            [("topic_block", topic)],
            [("rq_block", rq)],
            PromptTemplate::new("{[examples]}\n\n{[input_blocks]}\n{[output_blocks]}"),
            config,
        ).unwrap();
        let expected = "Example input:\n## @Block Topic topic_block\n|---\nA topic for research here\n---|\n\n\
            Example output:\n## @Block ResearchQuestions rq_block\n|---\n1. RQ1\n2. RQ2\n---|";
        assert!(agent.to_string().starts_with(expected));
    }

    #[test]
    fn test_construction_errors() {
        let registry = BlockTypeRegistry::new();
        let topic = registry.register("Topic").unwrap();
        let rq = registry.register("ResearchQuestions").unwrap();
        let build = |template: &str, config: AgentConfig| Agent::new(
            [("topic_block", topic.clone())],
            [("rq_block", rq.clone())],
            PromptTemplate::new(template),
            config,
        );

        match build("{[input_blocks]} {[rq_block]} {[date]}", AgentConfig::default()) {
            Err(AgentError::UnsupportedPlaceholder { placeholder, supported }) => {
                assert_eq!("date", placeholder);
                assert!(supported.contains(&"topic_block".to_string()));
            }
            other => panic!("expected UnsupportedPlaceholder, got {:?}", other),
        }
        match build("{[rq_block]}", AgentConfig::default()) {
            Err(AgentError::MissingPlaceholder { placeholder }) => assert_eq!("topic_block", placeholder),
            other => panic!("expected MissingPlaceholder, got {:?}", other),
        }
        match build("{[topic_block]}", AgentConfig::default()) {
            Err(AgentError::MissingPlaceholder { placeholder }) => assert_eq!("rq_block", placeholder),
            other => panic!("expected MissingPlaceholder, got {:?}", other),
        }
        match build("{[role]} {[input_blocks]} {[output_blocks]}", AgentConfig::default()) {
            Err(AgentError::MissingSlotValue { placeholder }) => assert_eq!("role", placeholder),
            other => panic!("expected MissingSlotValue, got {:?}", other),
        }
        assert!(matches!(build("{[examples]} {[input_blocks]} {[output_blocks]}", AgentConfig::default()),
            Err(AgentError::MissingSlotValue { .. })));
        assert!(matches!(build("{[algorithm]} {[input_blocks]} {[output_blocks]}", AgentConfig::default()),
            Err(AgentError::MissingSlotValue { .. })));

        let too_many_examples = AgentConfig {
            output_examples: vec!["a".to_string(), "b".to_string()],
            ..AgentConfig::default()
        };
        assert!(matches!(build("{[input_blocks]} {[output_blocks]}", too_many_examples),
            Err(AgentError::ExampleArity { direction: "output", expected: 1, got: 2 })));

        let conflicting_example = AgentConfig {
            input_examples: vec!["|---".to_string()],
            ..AgentConfig::default()
        };
        assert!(matches!(build("{[input_blocks]} {[output_blocks]}", conflicting_example), Err(AgentError::Render(_))));

        let template = PromptTemplate::new("{[input_blocks]} {[output_blocks]}");
        assert!(matches!(Agent::new([("role", topic.clone())], [("rq_block", rq.clone())], template.clone(), AgentConfig::default()),
            Err(AgentError::DuplicateSlotName { .. })));
        assert!(matches!(Agent::new([("same", topic.clone())], [("same", rq.clone())], template.clone(), AgentConfig::default()),
            Err(AgentError::DuplicateSlotName { .. })));
        assert!(matches!(Agent::new([("topic block", topic.clone())], [("rq_block", rq.clone())], template.clone(), AgentConfig::default()),
            Err(AgentError::InvalidSlotName { .. })));
        assert!(matches!(Agent::new([("topic_block", topic)], Vec::<(&str, BlockType)>::new(), template, AgentConfig::default()),
            Err(AgentError::NoOutputs)));
    }

    #[test]
    fn test_prompt_token_count() {
        let Fixture { topic, agent, .. } = fixture();
        let block = Block::new(topic, "GDPR and speech data");
        let prompt = agent.full_prompt(&block).unwrap();
        assert_eq!(prompt.len(), agent.prompt_token_count(&block, &count_tokens_by_len).unwrap());
    }

    #[test]
    fn test_config_from_json() {
        let config = AgentConfig::from_json_str(r#"{
            "role": "Expert scientific researcher",
            "algorithm": ["Determine the scope", "Create search criteria"]
        }"#).unwrap();
        assert_eq!(Some("Expert scientific researcher"), config.role.as_deref());
        assert_eq!(None, config.summary);
        assert_eq!(2, config.algorithm.len());
        assert!(config.input_examples.is_empty());
        assert!(AgentConfig::from_json_str("{\"role\": 3}").is_err());
    }
}
