/*!

This is the long-form manual for `sensory_analysis` and `sensory-report`.

## Preference tests

In a preference test, every panelist tastes the samples of one evaluation and
ranks them: position `1` is the preferred sample, then `2`, then `3`. A comment
can be attached to each placed sample.

## Aggregation

For each product, the number of first, second and third places are counted.
Positions outside `1..=3` and preferences for unknown products are skipped.

- `percentage` is the number of placements of the product divided by the
  number of panelists (one submission is one panelist).
- `average_position` is the mean of the positions given to the product. A
  product that nobody placed gets `3`, the worst position.

The products are returned from the best average position to the worst.

## Friedman test

With `k` products and `n` panelists, the statistic is

```text
chi_square = 12 n / (k (k + 1)) * sum_i (average_position_i - (k + 1) / 2)^2
```

This uses the average positions as mean ranks and is an approximation of
the test computed on the full rank matrix. The result is significant when
the statistic is above the chi-square critical value at `alpha = 0.05` for
`k - 1` degrees of freedom:

| df | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 10 |
|----|---|---|---|---|---|---|---|---|---|----|
| critical value | 3.84 | 5.99 | 7.81 | 9.49 | 11.07 | 12.59 | 14.07 | 15.51 | 16.92 | 18.31 |

Above 10 degrees of freedom, the critical value is approximated as `2.5 * df`.
The reported p-value is `0.01` for a significant result and `0.15` otherwise.

With fewer than 3 products or fewer than 3 panelists, the test is not run: the
statistic is `0`, the p-value `1`, and the result is not significant.

Two products are declared different when their average positions differ by
more than `0.5` (reported with a confidence level of 95, otherwise 80).

## Comments

Comments are sorted into positive and negative remarks by keywords (for
example `excelente` or `peor`). A comment may be both positive and negative.
The first 5 comments of each kind are kept.

## Reports

The `sensory-report` program reads the evaluation from a SQLite database,
runs the analysis and writes the report in JSON format:

```bash
sensory-report --database panel.db --seed panel.json --evaluation 12 --out report.json
```

The report is cached in the database for 30 days. `--force` invalidates the
cached reports of the evaluation and computes a new one.

The seed file describes an evaluation:

```json
{
  "evaluation": {"id": 12, "title": "Galletas de avena"},
  "products": [{"id": 1, "name": "Muestra 101", "code": "101", "position": 1}],
  "panelists": [
    {"panelistId": "p-1", "preferences": [{"productId": 1, "position": 1, "reason": "Excelente sabor"}]}
  ]
}
```

*/
