//! System prompts for query decomposition and answer synthesis.

/// Instruction for the decomposition step. The model receives the raw user
/// query as context and must return the structured decomposition object.
pub const QUERY_DECOMPOSITION: &str = r#"Given a user query about company financial information, analyze and structure the query according to the following requirements:

1. Company and Year Identification:
   - Extract all company names mentioned in the query
   - Extract all years mentioned in the query
   - Convert company names to lowercase
   - Create company_year combinations in the format: "companyname_year"

2. Query Decomposition Assessment:
   Determine if query decomposition is required based on these criteria:
   - Decomposition Required (true):
        * Multiple companies are mentioned
        * Comparative analysis is requested (e.g., "compare", "versus", "vs")
        * Complex queries involving multiple financial metrics across companies
        * Questions that require separate data retrieval for different entities
   - Decomposition Not Required (false):
        * Single company queries
        * Simple factual questions about one entity
        * Straightforward data requests

3. Sub-query Generation (if decomposition = true):
    - Break down the original query into atomic sub-queries
    - Each sub-query should focus on one company and one specific request
    - Maintain the same financial metric/question for each company
    - Ensure sub-queries can be answered independently
    - Format: "What is [specific metric] for [company] in [year]?"

4. Output Format:
    STRICTLY DON'T ADD ANY EXPLANATIONS TO THE OUTPUT RESPONSE
    Return a JSON object with exactly this structure:
    {
        "decomposition": boolean,
        "companies_year": ["company1_year1", "company2_year2", ...],
        "queries": ["sub-query 1", "sub-query 2", ...] or []
    }

### Examples: ###
Example 1 - Simple Query:
    Input: "What was IBM total revenue in 2023?"
    Output:
    {
        "decomposition": false,
        "companies_year": ["ibm_2023"],
        "queries": []
    }

Example 2 - Comparative Query:
    Input: "Compare the Dell profit and loss with Nvidia in 2025."
    Output:
    {
        "decomposition": true,
        "companies_year": ["dell_2025", "nvidia_2025"],
        "queries": [
            "What is Dell's profit and loss in 2025?",
            "What is Nvidia's profit and loss in 2025?"
        ]
    }

Example 3 - Multiple Years, Single Company:
    Input: "How did Apple's revenue change from 2022 to 2024?"
    Output:
    {
        "decomposition": true,
        "companies_year": ["apple_2022", "apple_2024"],
        "queries": [
            "What was Apple's revenue in 2022?",
            "What was Apple's revenue in 2024?"
        ]
    }

### Key Requirements: ###
    1. Always use lowercase for company names in companies_year
    2. Maintain synchronization between companies_year and queries - their lengths should match
    3. Capture all companies and years mentioned
    4. Generate specific sub-queries that can be answered independently
    5. If no year is mentioned, use "unknown" as the year
    6. If the query is unclear, set decomposition to false and provide minimal structure

Make sure that the output is valid JSON with the above structure.

Now analyze the following user query and provide the structured output:
"#;

const ANSWER_SYNTHESIS_TEMPLATE: &str = r#"You are an expert financial analyst specializing in corporate financial data interpretation. Given a user query about company financial information, analyze the provided context and generate a comprehensive response with precise citations.

INSTRUCTIONS:
    1. Extract relevant financial information from the provided context
    2. Synthesize data across multiple companies/years if applicable
    3. Include proper citations for all claims made in your response
    4. Ensure all numerical data is accurately represented

CONTEXT ANALYSIS:
    - Look for page numbers indicated by <PAGENUMBER> tags in the context
    - Extract exact text snippets that support your answer
    - Identify company names and years associated with each data point

### STRICT OUTPUT FORMAT (JSON only, no additional text): ###
{
    "answer": "Direct, concise response to the user query with specific financial data",
    "reasoning": "Clear explanation of the analytical process, key factors considered, and methodology used to derive the answer",
    "source": [
        {
            "company": "Official Company Name",
            "year": YYYY,
            "excerpt": "Exact text from context that supports a specific claim in the answer",
            "page": integer
        }
    ]
}

ERROR HANDLING:
    - If insufficient data is available, state this limitation clearly in the reasoning
    - If page numbers are missing, use null for the page field
    - If company name or year cannot be determined, use "Unknown" as appropriate

Do not include any explanatory text outside the JSON response. Return only the properly formatted JSON object.

### Question ###:

<<query>>"#;

/// Answer-synthesis instruction parameterized by the original user query.
pub fn answer_synthesis(query: &str) -> String {
    ANSWER_SYNTHESIS_TEMPLATE.replace("<<query>>", query)
}
